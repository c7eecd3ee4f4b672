//! Resolution pipeline and per-key single-flight.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gogrepo_manifest::{GameRecord, ManifestReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{DEFAULT_BASE_URL, DEFAULT_LOCALE, DEFAULT_TIMEOUT, GogClient};
use crate::error::MetadataError;
use crate::source::MetadataSource;
use crate::store::CacheStore;
use crate::types::{CacheEntry, GameInfo, MetadataKind, Payload, Source};

type Key = (String, MetadataKind);
type Shared = Option<Result<Arc<CacheEntry>, MetadataError>>;

/// Metadata cache settings.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub cache_dir: PathBuf,
    pub api_base: String,
    pub locale: String,
    pub timeout: Duration,
}

impl MetadataConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            api_base: DEFAULT_BASE_URL.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Description and cover cache backed by disk, the products API and the
/// manifest.
pub struct MetadataCache {
    store: CacheStore,
    manifest: Arc<ManifestReader>,
    source: Arc<dyn MetadataSource>,
    inflight: Mutex<HashMap<Key, watch::Receiver<Shared>>>,
}

enum Role {
    Leader(watch::Sender<Shared>),
    Follower(watch::Receiver<Shared>),
}

/// Removes the leader's in-flight entry however the leader ends, so a
/// cancelled leader releases its followers.
struct InflightGuard<'a> {
    map: &'a Mutex<HashMap<Key, watch::Receiver<Shared>>>,
    key: &'a Key,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
    }
}

impl MetadataCache {
    /// Creates a cache that talks to the GOG products API.
    pub fn new(
        config: &MetadataConfig,
        manifest: Arc<ManifestReader>,
    ) -> Result<Self, MetadataError> {
        let client = GogClient::new(&config.api_base, &config.locale, config.timeout)?;
        Ok(Self::with_source(
            &config.cache_dir,
            manifest,
            Arc::new(client),
        ))
    }

    /// Creates a cache over any metadata source.
    pub fn with_source(
        cache_dir: impl Into<PathBuf>,
        manifest: Arc<ManifestReader>,
        source: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            store: CacheStore::new(cache_dir),
            manifest,
            source,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn manifest(&self) -> &ManifestReader {
        &self.manifest
    }

    /// Returns the entry for `(game, kind)`, resolving and persisting it on
    /// a miss.
    ///
    /// Concurrent calls for the same key share one resolution and receive
    /// the same result, `NotFound` included.
    pub async fn get(
        &self,
        game: &str,
        kind: MetadataKind,
    ) -> Result<Arc<CacheEntry>, MetadataError> {
        let key: Key = (game.to_string(), kind);
        loop {
            let role = {
                let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
                match inflight.get(&key) {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.clone(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let _guard = InflightGuard {
                        map: &self.inflight,
                        key: &key,
                    };
                    let result = self.resolve(game, kind).await.map(Arc::new);
                    tx.send_replace(Some(result.clone()));
                    return result;
                }
                Role::Follower(mut rx) => {
                    let outcome = rx.wait_for(Option::is_some).await.map(|v| v.clone());
                    match outcome {
                        Ok(Some(result)) => return result,
                        _ => {
                            debug!(game, %kind, "in-flight resolution abandoned, retrying");
                        }
                    }
                }
            }
        }
    }

    async fn resolve(&self, game: &str, kind: MetadataKind) -> Result<CacheEntry, MetadataError> {
        let store = self.store.clone();
        let key = game.to_string();
        if let Some(entry) = blocking(move || store.load(&key, kind)).await? {
            debug!(game, %kind, "cache hit");
            return Ok(entry);
        }

        let not_found = || MetadataError::NotFound {
            game: game.to_string(),
            kind,
        };
        let Some(record) = self.find_record(game).await? else {
            debug!(game, "game not in manifest");
            return Err(not_found());
        };

        match self.from_api(kind, &record).await {
            Ok(payload) => return self.persist(game, kind, payload, Source::Api).await,
            Err(e) => info!(game, %kind, error = %e, "using manifest fallback"),
        }

        match self.from_manifest(game, kind, &record).await {
            Some(payload) => self.persist(game, kind, payload, Source::ManifestFallback).await,
            None => Err(not_found()),
        }
    }

    async fn from_api(
        &self,
        kind: MetadataKind,
        record: &GameRecord,
    ) -> Result<Payload, MetadataError> {
        let product_id = record
            .product_id()
            .ok_or_else(|| MetadataError::ApiUnavailable("manifest has no product id".into()))?;
        let details = self.source.fetch_product(&product_id).await?;
        match kind {
            MetadataKind::Description => details
                .description
                .map(Payload::Text)
                .ok_or_else(|| MetadataError::ApiUnavailable("product has no description".into())),
            MetadataKind::Cover => {
                let url = details
                    .cover_url
                    .ok_or_else(|| MetadataError::ApiUnavailable("product has no image".into()))?;
                let image = self.source.fetch_image(&url).await?;
                Ok(Payload::Binary {
                    bytes: image.bytes,
                    content_type: image.content_type,
                })
            }
        }
    }

    async fn from_manifest(
        &self,
        game: &str,
        kind: MetadataKind,
        record: &GameRecord,
    ) -> Option<Payload> {
        match kind {
            MetadataKind::Description => record.description().map(Payload::Text),
            MetadataKind::Cover => {
                let url = record.cover_url()?;
                match self.source.fetch_image(&url).await {
                    Ok(image) => Some(Payload::Binary {
                        bytes: image.bytes,
                        content_type: image.content_type,
                    }),
                    Err(e) => {
                        warn!(game, url = %url, error = %e, "manifest cover download failed");
                        None
                    }
                }
            }
        }
    }

    /// Looks a game up in the manifest. The first lookup after the file
    /// changes parses all of it, so it runs on the blocking pool.
    async fn find_record(&self, game: &str) -> Result<Option<GameRecord>, MetadataError> {
        let manifest = Arc::clone(&self.manifest);
        let game = game.to_string();
        Ok(blocking(move || manifest.find(&game)).await??)
    }

    async fn persist(
        &self,
        game: &str,
        kind: MetadataKind,
        payload: Payload,
        source: Source,
    ) -> Result<CacheEntry, MetadataError> {
        let entry = CacheEntry::new(game, kind, payload, source);
        let store = self.store.clone();
        let (entry, saved) = blocking(move || {
            let saved = store.save(&entry);
            (entry, saved)
        })
        .await?;
        if let Err(e) = saved {
            warn!(game, %kind, error = %e, "failed to persist cache entry");
        }
        Ok(entry)
    }

    /// Everything a detail view shows, with each part empty when it cannot
    /// be resolved.
    pub async fn info(&self, game: &str) -> GameInfo {
        let (description, cover) = tokio::join!(
            self.get(game, MetadataKind::Description),
            self.get(game, MetadataKind::Cover)
        );

        let title = match self.find_record(game).await {
            Ok(Some(record)) => record.long_title().unwrap_or(game).to_string(),
            _ => game.to_string(),
        };
        let mut info = GameInfo {
            title,
            ..GameInfo::default()
        };

        match description {
            Ok(entry) => {
                info.description_html = entry.payload.as_text().unwrap_or_default().to_string();
                info.description_source = Some(entry.source);
            }
            Err(e) => degrade(game, MetadataKind::Description, &e),
        }
        match cover {
            Ok(entry) => {
                info.cover = entry.payload.as_bytes().to_vec();
                info.cover_content_type = entry.payload.content_type().to_string();
                info.cover_source = Some(entry.source);
            }
            Err(e) => degrade(game, MetadataKind::Cover, &e),
        }
        info
    }

    /// Bytes used on disk.
    pub fn cache_size(&self) -> u64 {
        self.store.size()
    }

    pub fn clear(&self) -> Result<(), MetadataError> {
        info!(dir = %self.store.dir().display(), "clearing metadata cache");
        self.store.clear()
    }

    pub fn invalidate(&self, game: &str, kind: MetadataKind) -> Result<(), MetadataError> {
        self.store.invalidate(game, kind)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, MetadataError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| std::io::Error::other(e).into())
}

fn degrade(game: &str, kind: MetadataKind, e: &MetadataError) {
    if e.is_not_found() {
        debug!(game, %kind, "no metadata");
    } else {
        warn!(game, %kind, error = %e, "metadata lookup failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::mock_server;
    use crate::product::ProductDetails;
    use crate::source::{BoxFuture, Image};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\ncover";

    /// Scripted source counting every fetch.
    #[derive(Default)]
    struct MockSource {
        product: Mutex<Option<ProductDetails>>,
        image: Option<Image>,
        delay: Duration,
        product_calls: AtomicUsize,
        image_calls: AtomicUsize,
    }

    impl MockSource {
        fn product_calls(&self) -> usize {
            self.product_calls.load(Ordering::SeqCst)
        }

        fn set_product(&self, product: Option<ProductDetails>) {
            *self.product.lock().unwrap() = product;
        }
    }

    impl MetadataSource for MockSource {
        fn fetch_product(
            &self,
            _product_id: &str,
        ) -> BoxFuture<'_, Result<ProductDetails, MetadataError>> {
            Box::pin(async move {
                self.product_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.product
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| MetadataError::ApiUnavailable("down".into()))
            })
        }

        fn fetch_image(&self, _url: &str) -> BoxFuture<'_, Result<Image, MetadataError>> {
            Box::pin(async move {
                self.image_calls.fetch_add(1, Ordering::SeqCst);
                self.image
                    .clone()
                    .ok_or_else(|| MetadataError::ApiUnavailable("no image".into()))
            })
        }
    }

    fn api_product() -> ProductDetails {
        ProductDetails {
            title: Some("Trine 2".into()),
            description: Some("<p>from api</p>".into()),
            cover_url: Some("https://images.gog.com/v.png".into()),
        }
    }

    fn setup(manifest: &str, source: Arc<MockSource>) -> (TempDir, Arc<MetadataCache>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gog-manifest.dat");
        std::fs::write(&path, manifest).unwrap();
        let reader = Arc::new(ManifestReader::new(path));
        let cache = MetadataCache::with_source(dir.path().join("cache"), reader, source);
        (dir, Arc::new(cache))
    }

    const MANIFEST: &str = "[{'title': 'trine_2_complete_story', 'long_title': 'Trine 2: Complete Story',\n  'id': 1234, 'bg_url': '//images.gog.com/bg.png'}]";

    #[tokio::test]
    async fn api_result_is_persisted_and_reused() {
        let source = Arc::new(MockSource {
            image: Some(Image {
                bytes: PNG.to_vec(),
                content_type: "image/png".into(),
            }),
            ..MockSource::default()
        });
        source.set_product(Some(api_product()));
        let (_dir, cache) = setup(MANIFEST, Arc::clone(&source));

        let entry = cache
            .get("trine_2_complete_story", MetadataKind::Description)
            .await
            .unwrap();
        assert_eq!(entry.source, Source::Api);
        assert_eq!(entry.payload.as_text(), Some("<p>from api</p>"));

        let again = cache
            .get("trine_2_complete_story", MetadataKind::Description)
            .await
            .unwrap();
        assert_eq!(again.sha256, entry.sha256);
        assert_eq!(source.product_calls(), 1);
        assert!(cache.cache_size() > 0);
    }

    #[tokio::test]
    async fn disk_hit_skips_fetch() {
        let source = Arc::new(MockSource::default());
        let (_dir, cache) = setup(MANIFEST, Arc::clone(&source));
        let stored = CacheEntry::new(
            "trine_2_complete_story",
            MetadataKind::Cover,
            Payload::Binary {
                bytes: PNG.to_vec(),
                content_type: "image/png".into(),
            },
            Source::Api,
        );
        cache.store().save(&stored).unwrap();

        let entry = cache
            .get("trine_2_complete_story", MetadataKind::Cover)
            .await
            .unwrap();
        assert_eq!(entry.payload.as_bytes(), PNG);
        assert_eq!(source.product_calls(), 0);
        assert_eq!(source.image_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_fetch_once() {
        let source = Arc::new(MockSource {
            delay: Duration::from_millis(100),
            ..MockSource::default()
        });
        source.set_product(Some(api_product()));
        let (_dir, cache) = setup(MANIFEST, Arc::clone(&source));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache
                        .get("trine_2_complete_story", MetadataKind::Description)
                        .await
                })
            })
            .collect();
        let mut checksums = Vec::new();
        for task in tasks {
            checksums.push(task.await.unwrap().unwrap().sha256.clone());
        }

        assert_eq!(source.product_calls(), 1);
        assert!(checksums.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn not_found_is_shared_and_not_persisted() {
        // Known product id, API down, nothing usable in the manifest.
        let source = Arc::new(MockSource {
            delay: Duration::from_millis(100),
            ..MockSource::default()
        });
        let (_dir, cache) = setup("[{'title': 'bare', 'id': 7}]", Arc::clone(&source));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get("bare", MetadataKind::Description).await })
            })
            .collect();
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(err.is_not_found(), "{err}");
        }
        assert_eq!(source.product_calls(), 1);
        assert!(cache.store().load("bare", MetadataKind::Description).is_none());
        assert_eq!(cache.cache_size(), 0);

        // A later success is not masked by the earlier miss.
        source.set_product(Some(api_product()));
        let entry = cache.get("bare", MetadataKind::Description).await.unwrap();
        assert_eq!(entry.source, Source::Api);
    }

    #[tokio::test]
    async fn api_down_uses_manifest_description() {
        let source = Arc::new(MockSource::default());
        let manifest = "[{'title': 'foo', 'id': 1, 'description': 'from manifest'}]";
        let (_dir, cache) = setup(manifest, Arc::clone(&source));

        let entry = cache.get("foo", MetadataKind::Description).await.unwrap();
        assert_eq!(entry.source, Source::ManifestFallback);
        assert_eq!(entry.payload.as_text(), Some("from manifest"));
        let stored = cache.store().load("foo", MetadataKind::Description).unwrap();
        assert_eq!(stored.source, Source::ManifestFallback);
    }

    /// The manifest is a named pipe here, so reading it parks until the
    /// test writes it. That only works if the read stays off the
    /// single runtime thread.
    #[cfg(unix)]
    #[tokio::test(flavor = "current_thread")]
    async fn manifest_is_read_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gog-manifest.dat");
        let made = std::process::Command::new("mkfifo").arg(&path).status().unwrap();
        assert!(made.success());
        let reader = Arc::new(ManifestReader::new(&path));
        let cache = Arc::new(MetadataCache::with_source(
            dir.path().join("cache"),
            reader,
            Arc::new(MockSource::default()),
        ));

        let lookup = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get("foo", MetadataKind::Description).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!lookup.is_finished());

        tokio::task::spawn_blocking(move || {
            std::fs::write(&path, "[{'title': 'foo', 'description': 'piped'}]")
        })
        .await
        .unwrap()
        .unwrap();
        let entry = lookup.await.unwrap().unwrap();
        assert_eq!(entry.payload.as_text(), Some("piped"));
    }

    #[tokio::test]
    async fn unknown_game_is_not_found_without_fetch() {
        let source = Arc::new(MockSource::default());
        let (_dir, cache) = setup(MANIFEST, Arc::clone(&source));
        let err = cache.get("nope", MetadataKind::Cover).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(source.product_calls(), 0);
    }

    #[tokio::test]
    async fn abandoned_leader_lets_follower_retry() {
        let source = Arc::new(MockSource {
            delay: Duration::from_millis(300),
            ..MockSource::default()
        });
        source.set_product(Some(api_product()));
        let (_dir, cache) = setup(MANIFEST, Arc::clone(&source));

        let leader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get("trine_2_complete_story", MetadataKind::Description)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let follower = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get("trine_2_complete_story", MetadataKind::Description)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        leader.abort();

        let entry = follower.await.unwrap().unwrap();
        assert_eq!(entry.source, Source::Api);
        assert_eq!(source.product_calls(), 2);
    }

    #[tokio::test]
    async fn info_degrades_missing_parts() {
        let source = Arc::new(MockSource::default());
        let manifest = "[{'title': 'foo', 'long_title': 'Foo Game', 'summary': 'short'}]";
        let (_dir, cache) = setup(manifest, source);

        let info = cache.info("foo").await;
        assert_eq!(info.title, "Foo Game");
        assert_eq!(info.description_html, "short");
        assert_eq!(info.description_source, Some(Source::ManifestFallback));
        assert!(!info.has_cover());
        assert_eq!(info.cover_source, None);

        let unknown = cache.info("missing_game").await;
        assert_eq!(unknown.title, "missing_game");
        assert!(unknown.description_html.is_empty());
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let source = Arc::new(MockSource::default());
        source.set_product(Some(api_product()));
        let (_dir, cache) = setup(MANIFEST, Arc::clone(&source));
        let game = "trine_2_complete_story";

        cache.get(game, MetadataKind::Description).await.unwrap();
        cache.invalidate(game, MetadataKind::Description).unwrap();
        cache.get(game, MetadataKind::Description).await.unwrap();
        assert_eq!(source.product_calls(), 2);

        cache.clear().unwrap();
        assert_eq!(cache.cache_size(), 0);
    }

    #[tokio::test]
    async fn api_error_falls_back_to_manifest_cover() {
        let jpeg = b"\xff\xd8\xffbg-image".to_vec();
        let (url, hits, handle) = mock_server(vec![
            ("/products/", (500, "text/plain", b"internal error".to_vec())),
            ("/images/bg.jpg", (200, "image/jpeg", jpeg.clone())),
        ])
        .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gog-manifest.dat");
        let manifest = format!(
            "[{{'title': 'trine_2_complete_story', 'long_title': 'Trine 2: Complete Story',\n  'id': 1234, 'bg_url': '{url}/images/bg.jpg'}}]"
        );
        std::fs::write(&path, manifest).unwrap();
        let mut config = MetadataConfig::new(dir.path().join("cache"));
        config.api_base = url.clone();
        config.timeout = Duration::from_secs(5);
        let cache = MetadataCache::new(&config, Arc::new(ManifestReader::new(path))).unwrap();

        let entry = cache
            .get("trine_2_complete_story", MetadataKind::Cover)
            .await
            .unwrap();
        assert_eq!(entry.source, Source::ManifestFallback);
        assert_eq!(entry.payload.as_bytes(), jpeg.as_slice());
        assert_eq!(entry.payload.content_type(), "image/jpeg");

        let stored = cache
            .store()
            .load("trine_2_complete_story", MetadataKind::Cover)
            .unwrap();
        assert_eq!(stored.source, Source::ManifestFallback);

        // Served from disk afterwards.
        let before = hits.load(Ordering::SeqCst);
        let again = cache
            .get("trine_2_complete_story", MetadataKind::Cover)
            .await
            .unwrap();
        assert_eq!(again.payload.as_bytes(), jpeg.as_slice());
        assert_eq!(hits.load(Ordering::SeqCst), before);

        handle.abort();
    }
}
