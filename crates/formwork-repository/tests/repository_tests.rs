//! Integration tests for the template repository and locking engine

use std::sync::Arc;

use async_trait::async_trait;
use formwork::{
    FieldType, ModelDescriptor, ModelRegistry, Template, TemplateBuilder, TemplateKey,
    TemplateRecord, UserRef,
};
use formwork_repository::{
    BlobStorage, LockingError, MemoryBlobStorage, MemoryStore, RepositoryError, StoreError,
    TemplateFilter, TemplateRepository, TemplateStore,
};

fn registry() -> Arc<ModelRegistry> {
    let mut models = ModelRegistry::new();
    models.register(
        ModelDescriptor::new("purchase-order")
            .field("customer", FieldType::Text)
            .field("total", FieldType::Number),
    );
    models.register(
        ModelDescriptor::new("invoice")
            .with_parent("purchase-order")
            .field("due_date", FieldType::Date),
    );
    Arc::new(models)
}

fn repository(store: Arc<MemoryStore>) -> TemplateRepository {
    TemplateRepository::new(store, registry())
}

fn author() -> UserRef {
    UserRef::new("author", "The Author")
}

fn new_template(name: &str, language: &str) -> Template {
    TemplateBuilder::new(name, language)
        .model("invoice")
        .content(b"initial content".to_vec())
        .author(author())
        .map_field("customer_name", "customer")
        .build()
        .unwrap()
}

async fn seed(repo: &TemplateRepository, name: &str, language: &str) -> Template {
    repo.persist(new_template(name, language)).await.unwrap()
}

#[tokio::test]
async fn query_lists_all_templates_in_order() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await;
    seed(&repo, "test1", "de").await;
    seed(&repo, "test2", "en").await;
    seed(&repo, "letter", "fr").await;

    let templates = repo.query_templates().list().await.unwrap();
    let keys: Vec<String> = templates.iter().map(|t| t.key().to_string()).collect();
    assert_eq!(keys, vec!["letter_fr", "test1_de", "test1_en", "test2_en"]);
}

#[tokio::test]
async fn query_with_unmatched_language_is_empty() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await;

    let templates = repo.query_templates().language("xxx").list().await.unwrap();
    assert!(templates.is_empty());
}

#[tokio::test]
async fn query_filters_compose() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await;
    seed(&repo, "test1", "de").await;
    seed(&repo, "test2", "en").await;

    let by_language = repo.query_templates().language("en").list().await.unwrap();
    assert_eq!(by_language.len(), 2);

    let by_name = repo
        .query_templates()
        .document_name("test1")
        .list()
        .await
        .unwrap();
    assert_eq!(by_name.len(), 2);

    let both = repo
        .query_templates()
        .document_name("test1")
        .language("en")
        .list()
        .await
        .unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].key(), TemplateKey::new("test1", "en"));
}

#[tokio::test]
async fn query_rereads_store_state_on_every_list() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    let query = repo.query_templates();

    assert!(query.list().await.unwrap().is_empty());
    seed(&repo, "test1", "en").await;
    assert_eq!(query.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_template_finds_existing_and_misses_absent() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await;

    assert!(repo.get_template("test1", "en").await.unwrap().is_some());
    assert!(repo.get_template("XXXX", "XX").await.unwrap().is_none());
}

#[tokio::test]
async fn typed_lookup_accepts_the_model_and_its_ancestors() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await; // bound to "invoice"

    assert!(repo
        .get_template_as("test1", "en", "invoice")
        .await
        .unwrap()
        .is_some());
    // "invoice" specializes "purchase-order", so that expectation holds too
    assert!(repo
        .get_template_as("test1", "en", "purchase-order")
        .await
        .unwrap()
        .is_some());
    // absent stays absent rather than failing
    assert!(repo
        .get_template_as("XXXX", "XX", "invoice")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn typed_lookup_rejects_an_incompatible_model() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await;

    let result = repo.get_template_as("test1", "en", "unrelated").await;
    match result {
        Err(RepositoryError::ModelMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, "unrelated");
            assert_eq!(actual, "invoice");
        }
        other => panic!("expected ModelMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn locking_sets_the_owner_and_bumps_the_version_once() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    let template = seed(&repo, "test1", "en").await;
    let before = template.record().version;

    let user = UserRef::new("locking", "Locking User");
    let locked = repo.lock_for_edit(template, &user).await.unwrap();

    assert_eq!(locked.record().locking_user.as_ref(), Some(&user));
    assert_eq!(locked.record().version, before + 1);

    // the handle observes the store's committed version
    let stored = repo.get_template("test1", "en").await.unwrap().unwrap();
    assert_eq!(stored.record().version, locked.record().version);
}

#[tokio::test]
async fn relocking_by_the_owner_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    let template = seed(&repo, "test1", "en").await;

    let user = UserRef::new("user", "User");
    let locked = repo.lock_for_edit(template, &user).await.unwrap();
    let version = locked.record().version;

    let relocked = repo.lock_for_edit(locked, &user).await.unwrap();
    assert_eq!(relocked.record().locking_user.as_ref(), Some(&user));
    assert_eq!(relocked.record().version, version);
}

#[tokio::test]
async fn locking_a_template_held_by_another_user_fails() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    let template = seed(&repo, "test1", "en").await;

    let first = UserRef::new("first", "First User");
    let locked = repo.lock_for_edit(template, &first).await.unwrap();
    let version = locked.record().version;

    let second = UserRef::new("second", "Second User");
    let result = repo.lock_for_edit(locked, &second).await;
    match result {
        Err(RepositoryError::Locking(LockingError::LockedBy { user, .. })) => {
            assert_eq!(user, first);
        }
        other => panic!("expected LockedBy, got {other:?}"),
    }

    // stored record is untouched
    let stored = repo.get_template("test1", "en").await.unwrap().unwrap();
    assert_eq!(stored.record().version, version);
    assert_eq!(stored.record().locking_user.as_ref(), Some(&first));
}

#[tokio::test]
async fn stale_handle_loses_the_locking_race() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await;

    // two sessions fetch the same unlocked template independently
    let handle1 = repo.get_template("test1", "en").await.unwrap().unwrap();
    let handle2 = repo.get_template("test1", "en").await.unwrap().unwrap();

    let first = UserRef::new("first", "First");
    let second = UserRef::new("second", "Second User");

    repo.lock_for_edit(handle1, &first).await.unwrap();
    let result = repo.lock_for_edit(handle2, &second).await;
    assert!(matches!(
        result,
        Err(RepositoryError::Locking(LockingError::VersionConflict { .. }))
    ));

    let stored = repo.get_template("test1", "en").await.unwrap().unwrap();
    assert_eq!(stored.record().locking_user.as_ref(), Some(&first));
}

#[tokio::test]
async fn concurrent_lock_attempts_have_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    seed(&repo, "test1", "en").await;

    let handle1 = repo.get_template("test1", "en").await.unwrap().unwrap();
    let handle2 = repo.get_template("test1", "en").await.unwrap().unwrap();

    let a = UserRef::new("a", "A");
    let b = UserRef::new("b", "B");
    let (first, second) = tokio::join!(
        repo.lock_for_edit(handle1, &a),
        repo.lock_for_edit(handle2, &b),
    );

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    for result in [first, second] {
        if let Err(err) = result {
            assert!(matches!(err, RepositoryError::Locking(_)));
        }
    }
}

#[tokio::test]
async fn unlock_clears_the_owner_and_bumps_the_version() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    let template = seed(&repo, "test1", "en").await;

    let user = UserRef::new("user", "User");
    let locked = repo.lock_for_edit(template, &user).await.unwrap();
    let version = locked.record().version;

    let unlocked = repo.unlock(locked).await.unwrap();
    assert!(unlocked.record().locking_user.is_none());
    assert_eq!(unlocked.record().version, version + 1);
}

#[tokio::test]
async fn unlocking_an_unlocked_template_is_a_harmless_write() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    let template = seed(&repo, "test1", "en").await;
    let version = template.record().version;

    let unlocked = repo.unlock(template).await.unwrap();
    assert!(unlocked.record().locking_user.is_none());
    // still a committed write, so the version moves
    assert_eq!(unlocked.record().version, version + 1);
}

#[tokio::test]
async fn persisting_a_new_template_assigns_id_and_version() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);

    let persisted = repo.persist(new_template("test3", "de")).await.unwrap();
    assert!(persisted.record().id.is_some());
    assert_eq!(persisted.record().version, 1);
    assert!(!persisted.has_changed());

    let stored = repo.get_template("test3", "de").await.unwrap().unwrap();
    assert_eq!(stored.record().version, persisted.record().version);
}

#[tokio::test]
async fn persist_writes_the_blob_after_the_metadata_commit() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = repository(store).with_blob_storage(blobs.clone());

    let persisted = repo.persist(new_template("test3", "de")).await.unwrap();

    let blob = blobs.get(&persisted.record().file_name()).await.unwrap();
    assert_eq!(blob, b"initial content".to_vec());
}

#[tokio::test]
async fn changed_content_persists_and_replaces_the_blob() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = repository(store).with_blob_storage(blobs.clone());
    seed(&repo, "test1", "en").await;

    let mut template = repo.get_template("test1", "en").await.unwrap().unwrap();
    let version = template.record().version;
    template.update(b"updated content".to_vec(), UserRef::new("editor", "New Editor"));

    let persisted = repo.persist(template).await.unwrap();
    assert_eq!(persisted.record().version, version + 1);
    assert_eq!(persisted.record().editor.id, "editor");

    let blob = blobs.get("test1_en").await.unwrap();
    assert_eq!(blob, b"updated content".to_vec());
}

#[tokio::test]
async fn persisting_a_stale_handle_fails_and_skips_the_blob() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = repository(store).with_blob_storage(blobs.clone());

    let seeded = repo.persist(new_template("test1", "en")).await.unwrap();
    // forget the seeding write so later blob interactions stand out
    blobs.clear();

    let stale = repo.get_template("test1", "en").await.unwrap().unwrap();

    // another session locks first, bumping the stored version
    repo.lock_for_edit(seeded, &UserRef::new("user1", "user1"))
        .await
        .unwrap();

    let mut stale = stale;
    stale.update(b"conflicting edit".to_vec(), UserRef::new("user2", "user2"));
    let result = repo.persist(stale).await;

    assert!(matches!(
        result,
        Err(RepositoryError::Locking(LockingError::VersionConflict { .. }))
    ));
    // zero blob interactions on a failed metadata commit
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn persist_validation_failure_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = repository(store.clone()).with_blob_storage(blobs.clone());

    let template = TemplateBuilder::new("broken", "en")
        .model("invoice")
        .content(b"bytes".to_vec())
        .author(author())
        .map_field("bad", "no_such_field")
        .build()
        .unwrap();

    let result = repo.persist(template).await;
    match result {
        Err(RepositoryError::Validation(validation)) => {
            assert_eq!(validation.errors.len(), 1);
            assert_eq!(validation.errors[0].field, "bad");
        }
        other => panic!("expected Validation, got {other:?}"),
    }

    assert!(repo.get_template("broken", "en").await.unwrap().is_none());
    assert!(store.is_empty());
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn persisting_an_unchanged_handle_skips_validation() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store.clone());

    // a record with a mapping that would no longer validate, stored directly
    let mut record = new_template("legacy", "en").into_record();
    record
        .content_mapping
        .insert("stale_binding".to_string(), "dropped_field".to_string());
    store.save(record).await.unwrap();

    let fetched = repo.get_template("legacy", "en").await.unwrap().unwrap();
    assert!(!fetched.has_changed());

    // no content change, so the stale mapping is not re-validated
    let persisted = repo.persist(fetched).await.unwrap();
    assert_eq!(persisted.record().version, 2);
}

#[tokio::test]
async fn persisting_an_unknown_model_fails() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);

    let template = TemplateBuilder::new("orphan", "en")
        .model("not-registered")
        .author(author())
        .build()
        .unwrap();

    let result = repo.persist(template).await;
    assert!(matches!(result, Err(RepositoryError::UnknownModel(id)) if id == "not-registered"));
}

#[tokio::test]
async fn deleting_removes_record_and_blob() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = repository(store).with_blob_storage(blobs.clone());

    let persisted = seed(&repo, "test1", "en").await;
    assert!(blobs.exists("test1_en").await.unwrap());

    repo.delete(persisted).await.unwrap();
    assert!(repo.get_template("test1", "en").await.unwrap().is_none());
    assert!(!blobs.exists("test1_en").await.unwrap());
}

#[tokio::test]
async fn deleting_a_locked_template_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let repo = repository(store);
    let template = seed(&repo, "test1", "en").await;

    let user = UserRef::new("owner", "Owner");
    let locked = repo.lock_for_edit(template, &user).await.unwrap();
    let version = locked.record().version;

    let result = repo.delete(locked).await;
    assert!(matches!(
        result,
        Err(RepositoryError::Locking(LockingError::LockedBy { .. }))
    ));

    // the record stays retrievable with its lock intact
    let stored = repo.get_template("test1", "en").await.unwrap().unwrap();
    assert_eq!(stored.record().locking_user.as_ref(), Some(&user));
    assert_eq!(stored.record().version, version);
}

#[tokio::test]
async fn deleting_a_stale_handle_fails_and_keeps_the_blob() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = repository(store).with_blob_storage(blobs.clone());

    let persisted = seed(&repo, "test1", "en").await;
    let stale = repo.get_template("test1", "en").await.unwrap().unwrap();

    // a concurrent write moves the version on
    repo.persist(persisted).await.unwrap();

    let result = repo.delete(stale).await;
    assert!(matches!(
        result,
        Err(RepositoryError::Locking(LockingError::VersionConflict { .. }))
    ));
    assert!(blobs.exists("test1_en").await.unwrap());
}

/// A metadata store whose writes always fail, standing in for a broken
/// backend.
struct FailingStore;

#[async_trait]
impl TemplateStore for FailingStore {
    async fn find(&self, _key: &TemplateKey) -> Result<Option<TemplateRecord>, StoreError> {
        Ok(None)
    }

    async fn list(&self, _filter: &TemplateFilter) -> Result<Vec<TemplateRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn save(&self, _record: TemplateRecord) -> Result<TemplateRecord, StoreError> {
        Err(StoreError::Backend("write failed".to_string()))
    }

    async fn delete(&self, _key: &TemplateKey, _version: u64) -> Result<(), StoreError> {
        Err(StoreError::Backend("write failed".to_string()))
    }
}

#[tokio::test]
async fn store_failures_propagate_and_never_touch_the_blob_store() {
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = TemplateRepository::new(Arc::new(FailingStore), registry())
        .with_blob_storage(blobs.clone());

    let result = repo.persist(new_template("test1", "en")).await;
    assert!(matches!(result, Err(RepositoryError::Store(_))));
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn edit_session_scenario_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStorage::new());
    let repo = repository(store).with_blob_storage(blobs.clone());

    let a = UserRef::new("a", "User A");
    let b = UserRef::new("b", "User B");

    // the template exists, unlocked
    let template = seed(&repo, "invoice", "en").await;
    let base = template.record().version;

    // A locks it
    let template = repo.lock_for_edit(template, &a).await.unwrap();
    assert_eq!(template.record().version, base + 1);

    // B's lock attempt fails and moves nothing
    let b_handle = repo.get_template("invoice", "en").await.unwrap().unwrap();
    assert!(repo.lock_for_edit(b_handle, &b).await.is_err());
    assert_eq!(
        repo.get_template("invoice", "en")
            .await
            .unwrap()
            .unwrap()
            .record()
            .version,
        base + 1
    );

    // A uploads new content and persists
    let mut template = template;
    template.update(b"X".to_vec(), a.clone());
    let template = repo.persist(template).await.unwrap();
    assert_eq!(template.record().version, base + 2);
    assert_eq!(blobs.get("invoice_en").await.unwrap(), b"X".to_vec());

    // A unlocks
    let template = repo.unlock(template).await.unwrap();
    assert_eq!(template.record().version, base + 3);
    assert!(template.record().locking_user.is_none());

    // B deletes; record and blob both go
    let b_handle = repo.get_template("invoice", "en").await.unwrap().unwrap();
    repo.delete(b_handle).await.unwrap();
    assert!(repo.get_template("invoice", "en").await.unwrap().is_none());
    assert!(blobs.is_empty());
}
