mod common;

use common::World;
use paydesk::domain::action::CallbackAction;
use paydesk::domain::chat::{ChatId, ChatInfo, Markup, MemberStatus, UserId};
use paydesk::domain::money::Balance;
use paydesk::domain::ports::{Directory, IdSet, SettingKey};
use paydesk::infrastructure::recording::Outbound;
use rust_decimal_macros::dec;

const USER: i64 = 1;
const ADMIN: i64 = 10;
const CHANNEL: i64 = -100;

#[tokio::test]
async fn start_registers_and_welcomes_with_menu() {
    let world = World::new();
    world.register_user(USER, Some("ada"), "Ada").await;

    world.send(USER, USER, "/start").await;

    assert!(world.directory.user_exists(UserId(USER)).await.unwrap());
    let menu_sent = world.outbox().await.iter().any(|out| {
        matches!(
            out,
            Outbound::Message {
                markup: Markup::Menu(menu),
                ..
            } if menu.rows.iter().flatten().any(|label| label == "ADD FUNDS")
        )
    });
    assert!(menu_sent, "welcome must carry the main menu");
    assert!(
        world
            .texts_to(USER)
            .await
            .iter()
            .any(|t| t.contains("Hey ada"))
    );
}

#[tokio::test]
async fn banned_users_are_refused_at_start() {
    let world = World::new();
    world.register_user(USER, Some("ada"), "Ada").await;
    world.directory.set_banned(UserId(USER), true).await.unwrap();

    world.send(USER, USER, "/start").await;

    let texts = world.texts_to(USER).await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("banned"));
}

#[tokio::test]
async fn force_sub_gate_locks_until_joined() {
    let world = World::new();
    world.register_user(USER, Some("ada"), "Ada").await;
    world
        .directory
        .add_member(IdSet::ForceSub, CHANNEL)
        .await
        .unwrap();
    world
        .transport
        .register_chat(ChatInfo {
            id: ChatId(CHANNEL),
            title: Some("Announcements".to_string()),
            username: Some("news".to_string()),
        })
        .await;

    // No membership info yet: the check errs on the side of locked.
    world.send(USER, USER, "/start").await;
    let locked = world
        .outbox()
        .await
        .into_iter()
        .find_map(|out| match out {
            Outbound::Message {
                id,
                text,
                markup: Markup::Inline(keyboard),
                ..
            } if text.contains("Access locked") => Some((id.0, keyboard)),
            _ => None,
        })
        .expect("no locked notice");
    let buttons: Vec<String> = locked
        .1
        .rows
        .iter()
        .flatten()
        .map(|b| b.label.clone())
        .collect();
    assert!(buttons.iter().any(|label| label.contains("Join Announcements")));
    assert!(buttons.iter().any(|label| label.contains("Try Again")));

    // Still locked on retry.
    world
        .press(USER, USER, locked.0, &CallbackAction::AccessRetry.encode())
        .await;
    assert!(
        world
            .outbox()
            .await
            .iter()
            .any(|out| matches!(out, Outbound::EditText { text, .. } if text.contains("Still locked")))
    );

    // Join, retry again: verified and welcomed.
    world
        .transport
        .set_member(ChatId(CHANNEL), UserId(USER), MemberStatus::Member)
        .await;
    world
        .press(USER, USER, locked.0, &CallbackAction::AccessRetry.encode())
        .await;
    assert!(
        world
            .outbox()
            .await
            .iter()
            .any(|out| matches!(out, Outbound::EditText { text, .. } if text.contains("verified")))
    );
    assert!(
        world
            .texts_to(USER)
            .await
            .iter()
            .any(|t| t.contains("Hey ada"))
    );
}

#[tokio::test]
async fn menu_balance_stock_and_help() {
    let world = World::new();
    world.register_user(USER, Some("ada"), "Ada").await;
    world
        .directory
        .set_balance(UserId(USER), Balance::new(dec!(42)))
        .await
        .unwrap();
    world
        .directory
        .set_setting(SettingKey::Stock, "• 100 diamonds — 99\n• 500 diamonds — 450")
        .await
        .unwrap();

    world.send(USER, USER, "CHECK BALANCE").await;
    world.send(USER, USER, "STOCK").await;
    world.send(USER, USER, "BUY DIAMONDS").await;
    world.send(USER, USER, "HOW TO USE").await;

    let texts = world.texts_to(USER).await;
    assert!(texts.iter().any(|t| t.contains("Your balance: 42")));
    assert!(texts.iter().any(|t| t.contains("500 diamonds")));
    assert!(texts.iter().any(|t| t.contains("place your order through support")));
    assert!(texts.iter().any(|t| t.contains("How to use this bot")));
}

#[tokio::test]
async fn admin_commands_are_gated() {
    let world = World::new();
    world.register_user(USER, Some("ada"), "Ada").await;

    world.send(USER, USER, "/adminpanel").await;
    world.send(USER, USER, "/ban 2").await;

    let texts = world.texts_to(USER).await;
    assert_eq!(texts.len(), 2);
    assert!(texts.iter().all(|t| t.contains("Admins only")));
}

#[tokio::test]
async fn admin_panel_summarizes_state() {
    let world = World::new();
    world.seed_admin(ADMIN).await;
    world.seed_upi("merchant@okbank").await;
    world.register_user(USER, Some("ada"), "Ada").await;

    world.send(ADMIN, ADMIN, "/adminpanel").await;

    let texts = world.texts_to(ADMIN).await;
    assert!(texts.iter().any(|t| t.contains("Admin panel")
        && t.contains("merchant@okbank")
        && t.contains("/addbal")));
}

#[tokio::test]
async fn admin_roster_management() {
    let world = World::new();
    world.seed_admin(ADMIN).await;

    world.send(ADMIN, ADMIN, "/addadmin 11").await;
    world.send(ADMIN, ADMIN, "/admins").await;
    world.send(ADMIN, ADMIN, "/deladmin 11").await;

    assert!(!world.directory.contains(IdSet::Admins, 11).await.unwrap());
    let texts = world.texts_to(ADMIN).await;
    assert!(texts.iter().any(|t| t.contains("Added admin: 11")));
    assert!(texts.iter().any(|t| t.contains("• 11")));
    assert!(texts.iter().any(|t| t.contains("Removed admin: 11")));
}

#[tokio::test]
async fn balance_commands_credit_and_floor() {
    let world = World::new();
    world.seed_admin(ADMIN).await;
    world.register_user(USER, Some("ada"), "Ada").await;

    world.send(ADMIN, ADMIN, "/addbal 1 100").await;
    assert_eq!(world.balance_of(USER).await, Balance::new(dec!(100)));

    world.send(ADMIN, ADMIN, "/rembal 1 250").await;
    assert_eq!(world.balance_of(USER).await, Balance::ZERO);

    world.send(ADMIN, ADMIN, "/addbal 1 nonsense").await;
    assert!(
        world
            .texts_to(ADMIN)
            .await
            .iter()
            .any(|t| t.contains("Amount must be a positive number"))
    );
}

#[tokio::test]
async fn targets_resolve_from_username_and_reply() {
    let world = World::new();
    world.seed_admin(ADMIN).await;
    world.register_user(2, Some("eve"), "Eve").await;

    world.send(ADMIN, ADMIN, "/ban @eve").await;
    assert!(world.directory.is_banned(UserId(2)).await.unwrap());

    // Unban by replying to one of the target's messages.
    world
        .send_reply(ADMIN, ADMIN, "/unban", 321, Some(2))
        .await;
    assert!(!world.directory.is_banned(UserId(2)).await.unwrap());

    world.send(ADMIN, ADMIN, "/ban @nobody").await;
    assert!(
        world
            .texts_to(ADMIN)
            .await
            .iter()
            .any(|t| t.contains("Usage: /ban"))
    );
}

#[tokio::test]
async fn user_details_report() {
    let world = World::new();
    world.seed_admin(ADMIN).await;
    world.register_user(2, Some("eve"), "Eve").await;
    world
        .directory
        .set_balance(UserId(2), Balance::new(dec!(77)))
        .await
        .unwrap();

    world.send(ADMIN, ADMIN, "/user 2").await;
    world.send(ADMIN, ADMIN, "/balance 2").await;

    let texts = world.texts_to(ADMIN).await;
    assert!(
        texts
            .iter()
            .any(|t| t.contains("username: eve") && t.contains("balance: 77"))
    );
    assert!(texts.iter().any(|t| t.contains("Balance of 2: 77")));
}

#[tokio::test]
async fn settings_round_trip_through_commands() {
    let world = World::new();
    world.seed_admin(ADMIN).await;

    world.send(ADMIN, ADMIN, "/setwelcome Fresh stock daily!").await;
    world.send(ADMIN, ADMIN, "/getwelcome").await;
    world.send(ADMIN, ADMIN, "/setupiid merchant@okbank").await;
    world.send(ADMIN, ADMIN, "/getupi").await;
    world.send(ADMIN, ADMIN, "/setupiid not-a-upi").await;

    let texts = world.texts_to(ADMIN).await;
    assert!(texts.iter().any(|t| t.contains("Updated welcome message")));
    assert!(texts.iter().any(|t| t.contains("Fresh stock daily!")));
    assert!(texts.iter().any(|t| t.contains("UPI set to merchant@okbank")));
    assert!(texts.iter().any(|t| t.contains("Usage: /setupiid name@bank")));
    assert_eq!(
        world
            .directory
            .setting(SettingKey::UpiId)
            .await
            .unwrap()
            .as_deref(),
        Some("merchant@okbank")
    );
}

#[tokio::test]
async fn force_sub_roster_management() {
    let world = World::new();
    world.seed_admin(ADMIN).await;
    world
        .transport
        .register_chat(ChatInfo {
            id: ChatId(CHANNEL),
            title: Some("Announcements".to_string()),
            username: Some("news".to_string()),
        })
        .await;

    world.send(ADMIN, ADMIN, "/fsub_add @news").await;
    assert!(
        world
            .directory
            .contains(IdSet::ForceSub, CHANNEL)
            .await
            .unwrap()
    );

    world.send(ADMIN, ADMIN, "/fsub_list").await;
    world.send(ADMIN, ADMIN, &format!("/fsub_del {CHANNEL}")).await;
    assert!(
        !world
            .directory
            .contains(IdSet::ForceSub, CHANNEL)
            .await
            .unwrap()
    );

    let texts = world.texts_to(ADMIN).await;
    assert!(texts.iter().any(|t| t.contains("Added force-sub: Announcements")));
    assert!(texts.iter().any(|t| t.contains("Force-sub channels")));
    assert!(texts.iter().any(|t| t.contains("Removed force-sub")));
}

#[tokio::test]
async fn broadcast_counts_failures_without_aborting() {
    let world = World::new();
    world.seed_admin(ADMIN).await;
    for id in [1, 2, 3] {
        world.directory.upsert_user(UserId(id), None).await.unwrap();
    }
    world.transport.make_unreachable(ChatId(2)).await;

    world.send(ADMIN, ADMIN, "/broadcast Flash sale tonight!").await;

    assert!(
        world
            .texts_to(1)
            .await
            .iter()
            .any(|t| t.contains("Flash sale"))
    );
    assert!(
        world
            .texts_to(3)
            .await
            .iter()
            .any(|t| t.contains("Flash sale"))
    );
    let texts = world.texts_to(ADMIN).await;
    assert!(
        texts
            .iter()
            .any(|t| t.contains("Sent: 2") && t.contains("Failed: 1"))
    );
}
