mod support;

use serial_test::serial;
use shared::models::ChatTurn;
use shared::repos::{ConversationRepository, StoreError};
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn postgres_store_scopes_conversations_to_their_owner() {
    let Some(store) = support::test_store().await else {
        eprintln!("DATABASE_URL is not set; skipping postgres store test");
        return;
    };
    support::reset_database(store.pool()).await;
    store.ping().await.expect("ping should succeed");

    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let conversation_id = store
        .create_conversation(owner, "Planning")
        .await
        .expect("create should succeed");

    store
        .append_messages(
            owner,
            conversation_id,
            &[ChatTurn::user("plan my week"), ChatTurn::assistant("Sure.")],
        )
        .await
        .expect("append should succeed");
    store
        .append_messages(owner, conversation_id, &[ChatTurn::user("and next week?")])
        .await
        .expect("second append should succeed");

    assert_eq!(
        store
            .load_messages(owner, conversation_id)
            .await
            .expect("load should succeed"),
        Some(vec![
            ChatTurn::user("plan my week"),
            ChatTurn::assistant("Sure."),
            ChatTurn::user("and next week?"),
        ])
    );
    assert_eq!(
        store
            .load_messages(stranger, conversation_id)
            .await
            .expect("load should succeed"),
        None
    );
    assert!(
        !store
            .conversation_exists(stranger, conversation_id)
            .await
            .expect("exists should succeed")
    );
    assert!(matches!(
        store
            .append_messages(stranger, conversation_id, &[ChatTurn::user("hijack")])
            .await,
        Err(StoreError::ConversationNotFound)
    ));

    let listed = store
        .list_conversations(owner, 10)
        .await
        .expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Planning");
    assert!(listed[0].updated_at >= listed[0].created_at);
    assert!(
        store
            .list_conversations(stranger, 10)
            .await
            .expect("list should succeed")
            .is_empty()
    );

    assert!(
        !store
            .delete_conversation(stranger, conversation_id)
            .await
            .expect("delete should succeed")
    );
    assert!(
        store
            .delete_conversation(owner, conversation_id)
            .await
            .expect("delete should succeed")
    );
    assert_eq!(
        store
            .load_messages(owner, conversation_id)
            .await
            .expect("load should succeed"),
        None
    );
}
