//! The offline session-script interface.
//!
//! A script is a JSON-lines file: seed directives (admins, settings,
//! profiles, memberships) interleaved with the updates to replay. The
//! harness answers with a transcript of every outbound transport call,
//! also as JSON lines.

pub mod transcript_writer;
pub mod update_reader;
