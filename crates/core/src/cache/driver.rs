//! The cache handle hosts talk to.
//!
//! `SqliteCache` wires the storage handle, pragma profile, prepared
//! statements, transaction envelope, mirror and validation probe together
//! and implements the get/set/remove/flush contract on top of them.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::connection::Storage;
use super::envelope::ValueEnvelope;
use super::expiry::{Clock, SystemClock};
use super::mirror::Mirror;
use super::pragmas::{Phase, PragmaProfile};
use super::transaction::TransactionEnvelope;
use super::validation::{MARKER_KEY, ValidationState};
use crate::Error;
use crate::config::CacheOptions;
use crate::store::FallbackStore;

type TeardownAction = Box<dyn FnOnce() + Send>;

/// Persistent key-value cache backed by a single SQLite file.
///
/// One handle owns the file for its whole lifetime: it holds an exclusive
/// lock and one open transaction from construction until teardown. Dropping
/// the handle tears it down; [`SqliteCache::close`] does the same explicitly
/// and reports errors.
pub struct SqliteCache {
    pub(crate) options: CacheOptions,
    pub(crate) path: PathBuf,
    pub(crate) storage: Storage,
    pub(crate) pragmas: PragmaProfile,
    pub(crate) transaction: TransactionEnvelope,
    pub(crate) mirror: Mirror,
    pub(crate) fallback: Box<dyn FallbackStore>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) validation: ValidationState,
    teardown: Vec<TeardownAction>,
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("transactions", &self.transaction.count())
            .field("in_transaction", &self.transaction.is_open())
            .field("mirrored", &self.mirror.len())
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl SqliteCache {
    /// Open the cache described by `options`, using the wall clock.
    pub fn open(options: CacheOptions, fallback: Box<dyn FallbackStore>) -> Result<Self, Error> {
        Self::open_with_clock(options, fallback, Box::new(SystemClock))
    }

    /// Open the cache with an explicit time source.
    ///
    /// Opens (or recovers) the file, applies the construct pragmas, creates
    /// the schema, prepares statements, begins the lifetime transaction,
    /// then either flushes (debug mode) or validates the backend, and
    /// finally sweeps expired rows.
    ///
    /// # Errors
    ///
    /// - `OpenFailed` when the file is corrupt or locked; a corrupt file has
    ///   already been replaced by an empty one when this is returned.
    /// - `ValidationFailed` when the backend does not round-trip the marker.
    pub fn open_with_clock(
        options: CacheOptions, mut fallback: Box<dyn FallbackStore>, clock: Box<dyn Clock>,
    ) -> Result<Self, Error> {
        options.validate()?;

        let root = options.resolve_root(fallback.options());
        let path = CacheOptions::database_path(&root);

        let storage = match Storage::open(&path) {
            Ok(storage) => storage,
            Err(e) => {
                if e.is_reset() {
                    if let Err(err) = fallback.remove(MARKER_KEY) {
                        tracing::warn!(error = %err, "failed to forget validation marker after reset");
                    }
                }
                return Err(e);
            }
        };

        let pragmas = PragmaProfile::with_overrides(options.pragmas_construct.clone(), options.pragmas_destruct.clone());

        // From here on, Drop tears the handle down on every early return.
        let mut cache = Self {
            options,
            path,
            storage,
            pragmas,
            transaction: TransactionEnvelope::new(),
            mirror: Mirror::new(),
            fallback,
            clock,
            validation: ValidationState::Unvalidated,
            teardown: Vec::new(),
        };

        cache.pragmas.apply(&cache.storage, Phase::Construct);
        cache.storage.ensure_schema()?;
        cache.storage.prepare_statements()?;
        cache.begin_transaction()?;

        if cache.options.debug {
            cache.truncate()?;
        } else if cache.options.validate {
            cache.validate()?;
        }

        cache.garbagecollect()?;

        tracing::info!(
            path = %cache.path.display(),
            sqlite_version = Storage::sqlite_version(),
            debug = cache.options.debug,
            mirror = cache.options.store,
            validation = ?cache.validation,
            "cache ready"
        );

        Ok(cache)
    }

    /// Decoded value for `key`, `None` when missing or expired.
    ///
    /// Always `None` in debug mode.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, Error> {
        if self.options.debug {
            return Ok(None);
        }
        match self.retrieve(key)? {
            Some(envelope) => Ok(Some(serde_json::from_value(envelope.value)?)),
            None => Ok(None),
        }
    }

    /// Decoded value for `key`, or `default` when missing or expired.
    pub fn get_or<T: DeserializeOwned>(&mut self, key: &str, default: T) -> Result<T, Error> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Envelope for `key`, consulting the mirror first. Not bypassed by
    /// debug mode.
    pub fn retrieve(&mut self, key: &str) -> Result<Option<ValueEnvelope>, Error> {
        let now = self.clock.now();
        if let Some(envelope) = self.mirror.get(key, now) {
            tracing::debug!(key, "mirror hit");
            return Ok(Some(envelope.clone()));
        }
        self.retrieve_stored(key)
    }

    /// Envelope for `key` read from the database, admitted to the mirror
    /// on a hit.
    pub(crate) fn retrieve_stored(&mut self, key: &str) -> Result<Option<ValueEnvelope>, Error> {
        let Some(data) = self.storage.select_data(key, self.clock.now())? else {
            tracing::debug!(key, "cache miss");
            return Ok(None);
        };

        let envelope = ValueEnvelope::from_json(&data)?;
        tracing::debug!(key, "cache hit");
        if self.options.mirrors(key) {
            self.mirror.insert(key, envelope.clone());
        }
        Ok(Some(envelope))
    }

    /// Store `value` under `key` for `minutes` (0 = never expires).
    ///
    /// Writes even in debug mode.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T, minutes: u32) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value, minutes)
    }

    /// Store an already encoded JSON value.
    pub fn set_value(&mut self, key: &str, value: Value, minutes: u32) -> Result<(), Error> {
        let envelope = ValueEnvelope::new(value, minutes, self.clock.now());
        let data = envelope.to_json()?;
        self.storage.upsert_row(key, envelope.expire_at(), &data)?;

        if self.options.mirrors(key) {
            self.mirror.insert(key, envelope);
        } else {
            self.mirror.invalidate(key);
        }
        tracing::debug!(key, minutes, "cache set");
        Ok(())
    }

    /// Remove `key`. Removing a missing key succeeds.
    pub fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.mirror.invalidate(key);
        let removed = self.storage.delete_row(key)?;
        tracing::debug!(key, removed, "cache remove");
        Ok(())
    }

    /// Delete every entry, forget the validation marker and re-validate.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.truncate()?;
        if !self.options.debug && self.options.validate {
            self.validate()?;
        }
        Ok(())
    }

    /// Delete every entry and forget the validation marker, without
    /// re-validating.
    fn truncate(&mut self) -> Result<usize, Error> {
        self.mirror.clear();
        self.validation = ValidationState::Unvalidated;
        self.fallback.remove(MARKER_KEY)?;
        let deleted = self.storage.delete_all()?;
        tracing::info!(deleted, "cache flushed");
        Ok(deleted)
    }

    /// Delete rows whose expiry has passed. Returns how many were removed.
    pub fn garbagecollect(&mut self) -> Result<usize, Error> {
        let deleted = self.storage.purge_expired(self.clock.now())?;
        if deleted > 0 {
            tracing::info!(deleted, "collected expired cache rows");
        }
        Ok(deleted)
    }

    /// Whether `key` holds a live value.
    pub fn exists(&mut self, key: &str) -> Result<bool, Error> {
        Ok(self.retrieve(key)?.is_some())
    }

    /// Expiry of `key` in unix seconds; `None` when missing, expired, or
    /// stored without a TTL.
    pub fn expires(&mut self, key: &str) -> Result<Option<i64>, Error> {
        Ok(self.retrieve(key)?.and_then(|envelope| envelope.expires()))
    }

    /// Write time of `key` in unix seconds; `None` when missing or expired.
    pub fn created(&mut self, key: &str) -> Result<Option<i64>, Error> {
        Ok(self.retrieve(key)?.map(|envelope| envelope.created))
    }

    pub fn begin_transaction(&mut self) -> Result<(), Error> {
        self.transaction.begin(&self.storage)
    }

    pub fn end_transaction(&mut self) -> Result<(), Error> {
        self.transaction.end(&self.storage)
    }

    /// Number of transaction begins since the last commit.
    pub fn transactions_count(&self) -> u32 {
        self.transaction.count()
    }

    /// Commit everything written so far and start a new lifetime
    /// transaction.
    ///
    /// Runs the destruct profile (checkpointing the write-ahead log) and
    /// the construct profile in between, so the file on disk is complete
    /// after this returns.
    pub fn checkpoint(&mut self) -> Result<(), Error> {
        self.end_transaction()?;
        self.pragmas.apply(&self.storage, Phase::Destruct);
        self.pragmas.apply(&self.storage, Phase::Construct);
        self.begin_transaction()?;
        tracing::debug!(path = %self.path.display(), "cache checkpoint");
        Ok(())
    }

    /// Rows in the table, expired or not.
    pub fn row_count(&self) -> Result<u64, Error> {
        self.storage.row_count()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn pragmas(&self) -> &PragmaProfile {
        &self.pragmas
    }

    pub fn fallback(&self) -> &dyn FallbackStore {
        self.fallback.as_ref()
    }

    pub fn validation_state(&self) -> ValidationState {
        self.validation
    }

    pub fn sqlite_version(&self) -> &'static str {
        Storage::sqlite_version()
    }

    pub fn is_open(&self) -> bool {
        self.storage.is_open()
    }

    /// Register an action to run at teardown, before the transaction is
    /// committed. Actions run once, in registration order.
    pub fn on_teardown(&mut self, action: impl FnOnce() + Send + 'static) {
        self.teardown.push(Box::new(action));
    }

    /// Tear the handle down: run teardown actions, commit the lifetime
    /// transaction, apply the destruct pragmas and close the file. Closing
    /// the connection is what releases the exclusive lock; in WAL mode the
    /// destruct profile cannot leave exclusive locking on its own.
    ///
    /// Closing twice is a no-op; afterwards every operation fails with
    /// `Error::Closed`.
    pub fn close(&mut self) -> Result<(), Error> {
        for action in std::mem::take(&mut self.teardown) {
            action();
        }
        self.mirror.clear();

        if !self.storage.is_open() {
            return Ok(());
        }

        let committed = self.transaction.end(&self.storage);
        self.pragmas.apply(&self.storage, Phase::Destruct);
        let closed = self.storage.close();
        tracing::debug!(path = %self.path.display(), "cache closed");
        committed.and(closed)
    }
}

impl Drop for SqliteCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "cache teardown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};

    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;
    use crate::cache::expiry::ManualClock;
    use crate::store::{FileStore, MemoryStore};

    const NOW: i64 = 1_700_000_000;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Page {
        title: String,
        views: u32,
    }

    fn fallback(dir: &TempDir) -> Box<dyn FallbackStore> {
        Box::new(FileStore::new(dir.path().join("fallback"), None))
    }

    fn options(dir: &TempDir) -> CacheOptions {
        CacheOptions::rooted(dir.path())
    }

    fn open(dir: &TempDir, options: CacheOptions, clock: &ManualClock) -> SqliteCache {
        SqliteCache::open_with_clock(options, fallback(dir), Box::new(clock.clone())).unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        cache.set("greeting", "hello", 0).unwrap();
        let page = Page { title: "Home \"quoted\" <b>".into(), views: 3 };
        cache.set("pages/home", &page, 10).unwrap();

        assert_eq!(cache.get::<String>("greeting").unwrap().as_deref(), Some("hello"));
        assert_eq!(cache.get::<Page>("pages/home").unwrap(), Some(page));
        assert_eq!(cache.get::<String>("missing").unwrap(), None);
        assert_eq!(cache.get_or("missing", 7u32).unwrap(), 7);
    }

    #[test]
    fn test_value_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        cache.set("k", &42, 1).unwrap();
        clock.advance(59);
        assert_eq!(cache.get::<i32>("k").unwrap(), Some(42));

        clock.advance(1);
        assert_eq!(cache.get::<i32>("k").unwrap(), None);
        assert!(!cache.mirror.contains("k"));
    }

    #[test]
    fn test_value_expires_without_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, CacheOptions { store: false, ..options(&dir) }, &clock);

        cache.set("k", &42, 2).unwrap();
        clock.advance(119);
        assert_eq!(cache.get::<i32>("k").unwrap(), Some(42));
        clock.advance(1);
        assert_eq!(cache.get::<i32>("k").unwrap(), None);
        assert!(cache.mirror.is_empty());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        cache.set("k", "v", 0).unwrap();
        cache.remove("k").unwrap();
        assert_eq!(cache.get::<String>("k").unwrap(), None);

        cache.remove("k").unwrap();
        cache.remove("never-set").unwrap();
    }

    #[test]
    fn test_flush() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        cache.set("a", "1", 0).unwrap();
        cache.set("b", "2", 5).unwrap();
        cache.flush().unwrap();

        assert_eq!(cache.get::<String>("a").unwrap(), None);
        assert_eq!(cache.get::<String>("b").unwrap(), None);
        assert_eq!(cache.transactions_count(), 1);
        assert_eq!(cache.validation_state(), ValidationState::Validated);
        // Only the re-written validation marker is left.
        assert_eq!(cache.row_count().unwrap(), 1);
        assert!(cache.fallback().get(MARKER_KEY).unwrap().is_some());
    }

    #[test]
    fn test_repeated_set_keeps_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, CacheOptions { validate: false, ..options(&dir) }, &clock);

        for i in 0..5 {
            cache.set("k", &i, i).unwrap();
        }
        assert_eq!(cache.row_count().unwrap(), 1);
        assert_eq!(cache.get::<u32>("k").unwrap(), Some(4));
        assert_eq!(cache.expires("k").unwrap(), Some(NOW + 4 * 60));
    }

    #[test]
    fn test_set_overwrites_expired_row() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, CacheOptions { validate: false, ..options(&dir) }, &clock);

        cache.set("k", "old", 1).unwrap();
        clock.advance(3_600);
        cache.set("k", "new", 0).unwrap();
        assert_eq!(cache.row_count().unwrap(), 1);
        assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_garbagecollect() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(0);
        let mut cache = open(&dir, CacheOptions { validate: false, ..options(&dir) }, &clock);

        cache.storage.insert_row("a", 100, "{}").unwrap();
        cache.storage.insert_row("b", 0, "{}").unwrap();
        cache.storage.insert_row("c", NOW, "{}").unwrap();

        clock.set(200);
        assert_eq!(cache.garbagecollect().unwrap(), 1);
        assert!(!cache.storage.row_exists("a").unwrap());
        assert!(cache.storage.row_exists("b").unwrap());
        assert!(cache.storage.row_exists("c").unwrap());
    }

    #[test]
    fn test_open_collects_expired_rows() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        {
            let mut cache = open(&dir, options(&dir), &clock);
            cache.set("short", "v", 1).unwrap();
            cache.set("long", "v", 60).unwrap();
            cache.set("forever", "v", 0).unwrap();
        }

        clock.advance(120);
        let cache = open(&dir, options(&dir), &clock);
        assert!(!cache.storage.row_exists("short").unwrap());
        assert!(cache.storage.row_exists("long").unwrap());
        assert!(cache.storage.row_exists("forever").unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        {
            let mut cache = open(&dir, options(&dir), &clock);
            cache.set("k", &vec![1, 2, 3], 0).unwrap();
        }

        let mut cache = open(&dir, options(&dir), &clock);
        assert_eq!(cache.get::<Vec<i32>>("k").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_debug_mode_reads_miss() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, CacheOptions { debug: true, ..options(&dir) }, &clock);

        cache.set("k", "v", 0).unwrap();
        assert_eq!(cache.get::<String>("k").unwrap(), None);
        assert_eq!(cache.row_count().unwrap(), 1);
        assert!(cache.retrieve("k").unwrap().is_some());
    }

    #[test]
    fn test_debug_mode_flushes_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        {
            let mut cache = open(&dir, options(&dir), &clock);
            cache.set("k", "v", 0).unwrap();
        }

        let cache = open(&dir, CacheOptions { debug: true, ..options(&dir) }, &clock);
        assert_eq!(cache.row_count().unwrap(), 0);
        assert_eq!(cache.validation_state(), ValidationState::Unvalidated);
        assert!(cache.fallback().get(MARKER_KEY).unwrap().is_none());
    }

    #[test]
    fn test_mirror_follows_writes() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        cache.set("k", "v1", 0).unwrap();
        assert_eq!(cache.mirror.get("k", NOW).unwrap().value, Value::from("v1"));

        cache.set("k", "v2", 0).unwrap();
        assert_eq!(cache.mirror.get("k", NOW).unwrap().value, Value::from("v2"));

        cache.remove("k").unwrap();
        assert!(!cache.mirror.contains("k"));

        cache.set("k", "v3", 0).unwrap();
        cache.flush().unwrap();
        assert!(!cache.mirror.contains("k"));
    }

    #[test]
    fn test_mirror_is_filled_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        cache.storage.upsert_row("raw", 0, &ValueEnvelope::new(Value::from(5), 0, NOW).to_json().unwrap()).unwrap();
        assert!(!cache.mirror.contains("raw"));
        assert_eq!(cache.get::<i32>("raw").unwrap(), Some(5));
        assert!(cache.mirror.contains("raw"));
    }

    #[test]
    fn test_mirror_respects_ignore_filter() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let options = CacheOptions { store_ignore: Some("tmp/".into()), ..options(&dir) };
        let mut cache = open(&dir, options, &clock);

        cache.set("tmp/scratch", "v", 0).unwrap();
        cache.set("pages/home", "v", 0).unwrap();
        assert_eq!(cache.get::<String>("tmp/scratch").unwrap().as_deref(), Some("v"));

        assert!(!cache.mirror.contains("tmp/scratch"));
        assert!(cache.mirror.contains("pages/home"));
    }

    #[test]
    fn test_mirror_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, CacheOptions { store: false, ..options(&dir) }, &clock);

        cache.set("k", "v", 0).unwrap();
        assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v"));
        assert!(cache.mirror.is_empty());
    }

    #[test]
    fn test_exists_expires_created() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        cache.set("ttl", "v", 3).unwrap();
        cache.set("forever", "v", 0).unwrap();

        assert!(cache.exists("ttl").unwrap());
        assert!(!cache.exists("missing").unwrap());
        assert_eq!(cache.expires("ttl").unwrap(), Some(NOW + 180));
        assert_eq!(cache.expires("forever").unwrap(), None);
        assert_eq!(cache.created("ttl").unwrap(), Some(NOW));
        assert_eq!(cache.created("missing").unwrap(), None);
    }

    #[test]
    fn test_transactions_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        {
            let mut cache = open(&dir, options(&dir), &clock);
            assert_eq!(cache.transactions_count(), 1);

            cache.begin_transaction().unwrap();
            assert_eq!(cache.transactions_count(), 2);

            cache.end_transaction().unwrap();
            assert_eq!(cache.transactions_count(), 0);

            cache.begin_transaction().unwrap();
            cache.set("k", "v", 0).unwrap();
            cache.checkpoint().unwrap();
            assert_eq!(cache.transactions_count(), 1);
            assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v"));
        }

        let mut cache = open(&dir, options(&dir), &clock);
        assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_teardown_actions_run_in_order_once() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);
        let calls = Arc::new(Mutex::new(Vec::new()));

        for i in 1..=3 {
            let calls = Arc::clone(&calls);
            cache.on_teardown(move || calls.lock().unwrap().push(i));
        }

        cache.close().unwrap();
        cache.close().unwrap();
        drop(cache);
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_debug_output_reports_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);

        let rendered = format!("{cache:?}");
        assert!(rendered.contains("transactions: 1"));
        assert!(rendered.contains("in_transaction: true"));

        cache.end_transaction().unwrap();
        assert!(format!("{cache:?}").contains("in_transaction: false"));
    }

    #[test]
    fn test_teardown_runs_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let calls = Arc::new(Mutex::new(0));
        {
            let mut cache = open(&dir, options(&dir), &clock);
            let calls = Arc::clone(&calls);
            cache.on_teardown(move || *calls.lock().unwrap() += 1);
        }
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut cache = open(&dir, options(&dir), &clock);
        cache.close().unwrap();

        assert!(!cache.is_open());
        assert!(matches!(cache.set("k", "v", 0), Err(Error::Closed)));
        assert!(matches!(cache.get::<String>("k"), Err(Error::Closed)));
        assert!(matches!(cache.remove("k"), Err(Error::Closed)));
    }

    #[test]
    fn test_root_from_fallback_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let fallback = Box::new(FileStore::new(dir.path(), Some("plugin".into())));
        let cache = SqliteCache::open_with_clock(CacheOptions::default(), fallback, Box::new(clock)).unwrap();

        assert_eq!(cache.path(), dir.path().join("plugin").join("sqlitecache-1.sqlite"));
        assert!(cache.path().exists());
    }

    #[test]
    fn test_corrupt_file_fails_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let path = CacheOptions::database_path(dir.path());
        fs::write(&path, vec![0x42; 4096]).unwrap();

        let mut store = FileStore::new(dir.path().join("fallback"), None);
        store.set(MARKER_KEY, Value::from(NOW), 0).unwrap();

        let err = SqliteCache::open_with_clock(options(&dir), Box::new(store), Box::new(clock.clone())).unwrap_err();
        assert!(err.is_reset());
        assert!(FileStore::new(dir.path().join("fallback"), None).get(MARKER_KEY).unwrap().is_none());

        let mut cache = open(&dir, options(&dir), &clock);
        assert_eq!(cache.validation_state(), ValidationState::Validated);
        cache.set("k", "v", 0).unwrap();
        assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_second_handle_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(NOW);
        let mut first = open(&dir, options(&dir), &clock);
        first.set("k", "v", 0).unwrap();

        let second = SqliteCache::open_with_clock(
            CacheOptions { validate: false, ..options(&dir) },
            Box::new(MemoryStore::new(dir.path())),
            Box::new(clock.clone()),
        );
        assert!(matches!(second, Err(Error::OpenFailed { reset: false, .. })));

        assert!(first.path().exists());
        assert_eq!(first.get::<String>("k").unwrap().as_deref(), Some("v"));
    }
}
