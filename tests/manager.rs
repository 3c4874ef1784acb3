use chrono::Utc;
use session_lifecycle::{
    format_set_cookie, Error, FileHandler, MemoryHandler, PayloadCodec, SequentialIdGenerator,
    SessionConfig, SessionId, SessionManager, SessionRecord, StorageHandler, DEFAULT_TIMEOUT_KEY,
};

fn stored_record(handler: &MemoryHandler, id: &SessionId, record: &SessionRecord) {
    let payload = PayloadCodec::plain().encode(record).unwrap();
    handler.insert_written_at(id.clone(), payload, Utc::now());
}

fn long_id(fill: char) -> SessionId {
    SessionId::parse(fill.to_string().repeat(80)).unwrap()
}

/// Without a cookie, a new 80 character identifier is allocated and the record only holds the timeout.
#[async_std::test]
async fn test_fresh_session() {
    let config = SessionConfig::default()
        .with_name("SESS")
        .unwrap()
        .with_lifetime(900)
        .unwrap();
    let handler = MemoryHandler::new();
    let mut manager = SessionManager::new(config, handler.clone());

    let session = manager.start().await.unwrap();
    let id = manager.id().unwrap().clone();
    assert_eq!(id.as_str().len(), 80);
    assert!(id
        .as_str()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    assert_eq!(session.keys(), vec![DEFAULT_TIMEOUT_KEY.to_string()]);
    assert!(!manager.should_regenerate());

    let outcome = manager.end(None).await.unwrap();
    assert_eq!(outcome.id, id);
    assert!(!outcome.destroyed);
    assert!(!manager.is_active());
    assert!(handler.contains(&id));

    let cookie = format_set_cookie(manager.config(), &outcome.id, outcome.started_at);
    assert!(cookie.starts_with(&format!("SESS={id}; expires=")));
    assert!(cookie.contains("; max-age=900"));
}

/// A known identifier resumes the stored record.
#[async_std::test]
async fn test_resumed_session() {
    let handler = MemoryHandler::new();
    let id = long_id('a');
    let mut record = SessionRecord::new();
    record.insert("user", "joe").unwrap();
    stored_record(&handler, &id, &record);

    let mut manager = SessionManager::new(SessionConfig::default(), handler);
    manager.set_identifier(id.clone()).unwrap();
    let session = manager.start().await.unwrap();

    assert_eq!(manager.id(), Some(&id));
    assert_eq!(session.get::<String>("user").as_deref(), Some("joe"));
    assert_eq!(session.get_or("missing", String::from("default")), "default");
}

/// An expired session is reset: new identifier, old record gone, timeout in the future.
#[async_std::test]
async fn test_timeout_resets_session() {
    let handler = MemoryHandler::new();
    let id = long_id('b');
    let mut record = SessionRecord::new();
    record
        .insert(DEFAULT_TIMEOUT_KEY, Utc::now().timestamp() - 1)
        .unwrap();
    record.insert("user", "joe").unwrap();
    stored_record(&handler, &id, &record);

    let mut manager = SessionManager::new(SessionConfig::default(), handler.clone());
    manager.set_identifier(id.clone()).unwrap();
    let session = manager.start().await.unwrap();

    assert_ne!(manager.id(), Some(&id));
    assert!(!session.has("user"));
    let timeout: i64 = session.get(DEFAULT_TIMEOUT_KEY).unwrap();
    assert!(timeout > Utc::now().timestamp());
    assert!(!handler.contains(&id));
}

/// A session that has not timed out keeps its identifier and gets its timeout extended.
#[async_std::test]
async fn test_active_session_extends_timeout() {
    let handler = MemoryHandler::new();
    let id = long_id('c');
    let soon = Utc::now().timestamp() + 10;
    let mut record = SessionRecord::new();
    record.insert(DEFAULT_TIMEOUT_KEY, soon).unwrap();
    stored_record(&handler, &id, &record);

    let config = SessionConfig::default().with_lifetime(3600).unwrap();
    let mut manager = SessionManager::new(config, handler);
    manager.set_identifier(id.clone()).unwrap();
    let session = manager.start().await.unwrap();

    assert_eq!(manager.id(), Some(&id));
    let timeout: i64 = session.get(DEFAULT_TIMEOUT_KEY).unwrap();
    assert!(timeout >= soon + 3000);
}

/// Identifiers of the wrong length are replaced, but the data is kept.
#[async_std::test]
async fn test_untrusted_length_regenerates_keeping_data() {
    let handler = MemoryHandler::new();
    let id = SessionId::parse("short").unwrap();
    let mut record = SessionRecord::new();
    record.insert("cart", vec![1, 2, 3]).unwrap();
    stored_record(&handler, &id, &record);

    let mut manager = SessionManager::new(SessionConfig::default(), handler.clone());
    manager.set_identifier(id.clone()).unwrap();
    assert!(manager.should_regenerate());
    let session = manager.start().await.unwrap();

    let new_id = manager.id().unwrap().clone();
    assert_eq!(new_id.as_str().len(), 80);
    assert!(!manager.should_regenerate());
    assert_eq!(session.get::<Vec<i64>>("cart"), Some(vec![1, 2, 3]));
    assert!(!handler.contains(&id));

    manager.end(None).await.unwrap();
    assert!(handler.contains(&new_id));
}

/// Lifecycle operations in the wrong state fail without side effects.
#[async_std::test]
async fn test_lifecycle_ordering_errors() {
    let mut manager = SessionManager::new(SessionConfig::default(), MemoryHandler::new());

    assert!(matches!(manager.end(None).await, Err(Error::NotStarted)));
    assert!(matches!(manager.reset().await, Err(Error::NotStarted)));
    assert!(matches!(manager.destroy().await, Err(Error::NotStarted)));
    assert!(matches!(manager.session(), Err(Error::NotStarted)));

    manager.start().await.unwrap();
    assert!(matches!(manager.start().await, Err(Error::AlreadyStarted)));
    assert!(matches!(
        manager.set_identifier(long_id('d')),
        Err(Error::IdentifierLocked)
    ));
    assert!(manager.is_active());

    manager.end(None).await.unwrap();
    manager.set_identifier(long_id('d')).unwrap();
    assert_eq!(manager.id(), Some(&long_id('d')));
}

/// Once the headers are sent, a session can no longer be started.
#[async_std::test]
async fn test_start_after_headers_sent() {
    let mut manager = SessionManager::new(SessionConfig::default(), MemoryHandler::new());
    manager.mark_headers_sent();
    assert!(matches!(
        manager.start().await,
        Err(Error::HeadersAlreadySent)
    ));
    assert!(!manager.is_active());
}

/// A manager that is kept after its response went out refuses to start another session.
#[async_std::test]
async fn test_reused_manager_after_headers_sent() {
    let mut manager = SessionManager::new(SessionConfig::default(), MemoryHandler::new());
    manager.start().await.unwrap();
    manager.end(None).await.unwrap();
    manager.mark_headers_sent();

    assert!(matches!(
        manager.start().await,
        Err(Error::HeadersAlreadySent)
    ));
}

/// A failure while loading the record closes the storage handler again.
#[async_std::test]
async fn test_failed_start_closes_handler() {
    let directory = tempfile::tempdir().unwrap();
    let config = SessionConfig::default()
        .with_save_path(directory.path())
        .unwrap()
        .with_gc_probability(0, 1)
        .unwrap();
    let id = long_id('g');
    // A directory in place of the session file makes reading it fail.
    std::fs::create_dir(directory.path().join(format!("sess_{id}"))).unwrap();

    let mut manager = SessionManager::new(config, FileHandler::new());
    manager.set_identifier(id.clone()).unwrap();
    assert!(matches!(
        manager.start().await,
        Err(Error::Storage { .. })
    ));
    assert!(!manager.is_active());
    assert!(matches!(
        manager.handler().session_path(&id),
        Err(Error::NotOpen)
    ));
}

/// Resetting destroys the old record and continues with an empty session.
#[async_std::test]
async fn test_reset() {
    let handler = MemoryHandler::new();
    let mut manager = SessionManager::new(SessionConfig::default(), handler.clone())
        .with_generator(SequentialIdGenerator::default());

    let session = manager.start().await.unwrap();
    session.set("user", "joe").unwrap();
    let first_id = manager.id().unwrap().clone();
    manager.end(None).await.unwrap();
    assert!(handler.contains(&first_id));

    manager.set_identifier(first_id.clone()).unwrap();
    let session = manager.start().await.unwrap();
    assert!(session.has("user"));
    let reset_session = manager.reset().await.unwrap();

    assert_ne!(manager.id(), Some(&first_id));
    assert!(!handler.contains(&first_id));
    assert!(!session.has("user"));
    assert!(reset_session.is_empty());
}

/// `Session::regenerate` issues a new identifier at the end of the request and keeps the data.
#[async_std::test]
async fn test_regenerate_on_demand() {
    let handler = MemoryHandler::new();
    let mut manager = SessionManager::new(SessionConfig::default(), handler.clone())
        .with_generator(SequentialIdGenerator::default());

    let session = manager.start().await.unwrap();
    let first_id = manager.id().unwrap().clone();
    session.set("user", "joe").unwrap();
    session.regenerate();
    let outcome = manager.end(None).await.unwrap();

    assert_ne!(outcome.id, first_id);
    assert!(!handler.contains(&first_id));

    manager.set_identifier(outcome.id.clone()).unwrap();
    let session = manager.start().await.unwrap();
    assert_eq!(session.get::<String>("user").as_deref(), Some("joe"));
}

/// Destroyed sessions are removed from storage and report that no cookie should be sent.
#[async_std::test]
async fn test_destroy() {
    let handler = MemoryHandler::new();
    let mut manager = SessionManager::new(SessionConfig::default(), handler.clone());

    let session = manager.start().await.unwrap();
    session.set("user", "joe").unwrap();
    let id = manager.id().unwrap().clone();
    manager.end(None).await.unwrap();

    manager.set_identifier(id.clone()).unwrap();
    let session = manager.start().await.unwrap();
    session.destroy();
    assert!(session.is_empty());
    let outcome = manager.end(None).await.unwrap();

    assert!(outcome.destroyed);
    assert!(!handler.contains(&id));
    assert!(handler.is_empty());
}

/// A record override replaces the session values when writing.
#[async_std::test]
async fn test_end_with_record_override() {
    let handler = MemoryHandler::new();
    let mut manager = SessionManager::new(SessionConfig::default(), handler.clone());

    let session = manager.start().await.unwrap();
    session.set("ignored", true).unwrap();
    let mut record = SessionRecord::new();
    record.insert("user", "ann").unwrap();
    let outcome = manager.end(Some(record)).await.unwrap();

    manager.set_identifier(outcome.id).unwrap();
    let session = manager.start().await.unwrap();
    assert!(!session.has("ignored"));
    assert_eq!(session.get::<String>("user").as_deref(), Some("ann"));
}

/// With a garbage collection probability of one, every start sweeps expired sessions.
#[async_std::test]
async fn test_probabilistic_garbage_collection() {
    let handler = MemoryHandler::new();
    let stale = long_id('e');
    handler.insert_written_at(
        stale.clone(),
        Vec::new(),
        Utc::now() - chrono::Duration::seconds(120),
    );

    let config = SessionConfig::default()
        .with_lifetime(60)
        .unwrap()
        .with_gc_probability(1, 1)
        .unwrap();
    let mut manager = SessionManager::new(config, handler.clone());
    manager.start().await.unwrap();

    assert!(!handler.contains(&stale));
}

/// Handlers refuse to work without a configuration.
#[async_std::test]
async fn test_handler_requires_configuration() {
    let mut handler = MemoryHandler::new();
    let id = long_id('f');
    assert!(matches!(
        handler.open(std::path::Path::new("unused")).await,
        Err(Error::NotConfigured)
    ));
    assert!(matches!(handler.read(&id).await, Err(Error::NotConfigured)));
    assert!(matches!(
        handler.write(&id, b"{}").await,
        Err(Error::NotConfigured)
    ));
}
