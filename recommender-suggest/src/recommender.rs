//! The recommend operation.

use std::collections::HashSet;

use anyhow::anyhow;
use cadence::{CountedExt, Histogrammed, StatsdClient};
use futures::{stream, StreamExt};
use rand::{seq::SliceRandom, Rng};
use recommender_settings::Settings;

use crate::{
    catalog::Catalog, query::parse_products, search::CustomSearchProvider, SetupError,
    SuggestionProvider,
};

/// The most recommendations any query returns.
pub const MAX_RESULTS: usize = 6;

/// How many fallback lookups run at once unless configured otherwise.
const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 4;

/// Resolves product queries into a random selection of accessory names.
///
/// Everything in here is immutable once built, so one instance is shared by
/// every request handler.
pub struct Recommender {
    /// Products with a fixed list of accessories.
    catalog: Catalog,
    /// Asked about any product that is not in the catalog.
    fallback: Box<dyn SuggestionProvider>,
    /// The most recommendations returned for one query.
    max_results: usize,
    /// The most fallback lookups in flight for one query.
    max_concurrent_lookups: usize,
    /// Where to report metrics.
    metrics_client: StatsdClient,
}

impl Recommender {
    /// Create a recommender from its parts. `max_results` is capped at
    /// [`MAX_RESULTS`].
    pub fn new(
        catalog: Catalog,
        fallback: Box<dyn SuggestionProvider>,
        max_results: usize,
        metrics_client: StatsdClient,
    ) -> Self {
        Self {
            catalog,
            fallback,
            max_results: max_results.min(MAX_RESULTS),
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
            metrics_client,
        }
    }

    /// Limit how many fallback lookups one query runs at once. Zero is
    /// treated as one.
    #[must_use]
    pub fn with_max_concurrent_lookups(mut self, max_concurrent_lookups: usize) -> Self {
        self.max_concurrent_lookups = max_concurrent_lookups.max(1);
        self
    }

    /// Create a recommender with the configured catalog and a web search
    /// fallback.
    ///
    /// # Errors
    /// If `recommend.max_results` is above [`MAX_RESULTS`],
    /// `recommend.max_concurrent_lookups` is zero, or the search provider
    /// cannot be set up, for example because its credentials are missing.
    pub fn from_settings(
        settings: &Settings,
        metrics_client: StatsdClient,
    ) -> Result<Self, SetupError> {
        if settings.recommend.max_results > MAX_RESULTS {
            return Err(SetupError::InvalidConfiguration(anyhow!(
                "recommend.max_results must be at most {}",
                MAX_RESULTS
            )));
        }
        if settings.recommend.max_concurrent_lookups == 0 {
            return Err(SetupError::InvalidConfiguration(anyhow!(
                "recommend.max_concurrent_lookups must be at least 1"
            )));
        }

        let catalog = Catalog::from(&settings.catalog);
        let fallback = CustomSearchProvider::new_boxed(&settings.search)?;

        tracing::info!(
            r#type = "suggest.recommender.setup",
            products = catalog.len(),
            fallback = %fallback.name(),
            max_results = settings.recommend.max_results,
            max_concurrent_lookups = settings.recommend.max_concurrent_lookups,
            "Set up recommender"
        );

        Ok(Self::new(
            catalog,
            fallback,
            settings.recommend.max_results,
            metrics_client,
        )
        .with_max_concurrent_lookups(settings.recommend.max_concurrent_lookups))
    }

    /// The catalog consulted before the fallback.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Recommend accessories for a comma separated list of products.
    ///
    /// Catalog products contribute all of their accessories. Every other
    /// product is looked up with the fallback provider, a few at a time, and a
    /// failed lookup contributes nothing. The candidates are deduplicated and a
    /// uniformly random selection of at most `max_results` of them is returned
    /// in random order.
    pub async fn recommend(&self, query: &str) -> Vec<String> {
        let products = parse_products(query);
        self.metrics_client
            .histogram("recommend.items", products.len() as u64)
            .ok();

        let mut candidates: HashSet<String> = HashSet::new();
        let mut unresolved = Vec::new();
        for product in &products {
            match self.catalog.get(product) {
                Some(accessories) => {
                    self.metrics_client.incr("recommend.catalog.hit").ok();
                    candidates.extend(accessories.iter().cloned());
                }
                None => unresolved.push(product.as_str()),
            }
        }

        let found: Vec<Vec<String>> = stream::iter(unresolved)
            .map(|product| self.lookup(product))
            .buffer_unordered(self.max_concurrent_lookups)
            .collect()
            .await;
        candidates.extend(found.into_iter().flatten());

        let recommended = sample(candidates, self.max_results, &mut rand::thread_rng());
        self.metrics_client
            .histogram("recommend.count", recommended.len() as u64)
            .ok();
        recommended
    }

    /// Ask the fallback about one product, turning any failure into an empty
    /// list after reporting it.
    async fn lookup(&self, product: &str) -> Vec<String> {
        self.metrics_client.incr("recommend.fallback.request").ok();
        match self.fallback.suggest(product).await {
            Ok(titles) => {
                tracing::debug!(
                    r#type = "suggest.fallback.success",
                    %product,
                    title_count = titles.len(),
                    "Fallback provided titles"
                );
                titles
            }
            Err(error) => {
                tracing::warn!(
                    r#type = "suggest.fallback.error",
                    error_kind = error.kind(),
                    %error,
                    provider = %self.fallback.name(),
                    "Fallback failed, using no recommendations for this product"
                );
                self.metrics_client
                    .incr_with_tags("recommend.fallback.error")
                    .with_tag("kind", error.kind())
                    .send();
                Vec::new()
            }
        }
    }
}

/// Pick a uniformly random selection of at most `limit` candidates, in random
/// order.
pub fn sample<R: Rng + ?Sized>(candidates: HashSet<String>, limit: usize, rng: &mut R) -> Vec<String> {
    let mut candidates: Vec<String> = candidates.into_iter().collect();
    candidates.shuffle(rng);
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::{sample, Recommender};
    use crate::{Catalog, SetupError, SuggestError, SuggestionProvider};
    use async_trait::async_trait;
    use cadence::{NopMetricSink, SpyMetricSink, StatsdClient};
    use pretty_assertions::assert_eq;
    use recommender_settings::{CatalogSettings, Settings};
    use std::{
        collections::{HashMap, HashSet},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    /// A fallback with canned answers that counts how often it is asked.
    struct FakeProvider {
        answers: HashMap<String, Vec<String>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProvider {
        fn new(answers: &[(&str, &[&str])]) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let answers = answers
                .iter()
                .map(|(q, titles)| {
                    (
                        q.to_string(),
                        titles.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect();
            (
                Self {
                    answers,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl SuggestionProvider for FakeProvider {
        fn name(&self) -> String {
            "fake".to_string()
        }

        async fn suggest(&self, product: &str) -> Result<Vec<String>, SuggestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answers.get(product).cloned().unwrap_or_default())
        }
    }

    /// A fallback that always fails.
    struct BrokenProvider;

    #[async_trait]
    impl SuggestionProvider for BrokenProvider {
        fn name(&self) -> String {
            "broken".to_string()
        }

        async fn suggest(&self, _product: &str) -> Result<Vec<String>, SuggestError> {
            Err(SuggestError::Status(500))
        }
    }

    /// A slow fallback that records the most lookups it saw in flight at once.
    #[derive(Default)]
    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SuggestionProvider for SlowProvider {
        fn name(&self) -> String {
            "slow".to_string()
        }

        async fn suggest(&self, product: &str) -> Result<Vec<String>, SuggestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![format!("{} accessory", product)])
        }
    }

    fn metrics() -> StatsdClient {
        StatsdClient::from_sink("recommender-test", NopMetricSink)
    }

    fn recommender(fallback: Box<dyn SuggestionProvider>) -> Recommender {
        Recommender::new(
            Catalog::from(&CatalogSettings::default()),
            fallback,
            6,
            StatsdClient::from_sink("recommender-test", NopMetricSink),
        )
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn assert_unique(recommended: &[String]) {
        let unique: HashSet<_> = recommended.iter().collect();
        assert_eq!(unique.len(), recommended.len(), "duplicates in {:?}", recommended);
    }

    #[tokio::test]
    async fn laptop_is_served_from_the_catalog() {
        let (fake, calls) = FakeProvider::new(&[]);
        let recommended = recommender(Box::new(fake)).recommend("laptop").await;

        assert!(recommended.len() <= 3);
        assert!(recommended
            .iter()
            .all(|r| set(&["mouse", "keyboard", "monitor"]).contains(r)));
        assert_unique(&recommended);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn laptop_and_phone_fill_all_six_slots() {
        let (fake, calls) = FakeProvider::new(&[]);
        let recommended = recommender(Box::new(fake)).recommend("Laptop, PHONE").await;

        let got: HashSet<String> = recommended.iter().cloned().collect();
        assert_eq!(recommended.len(), 6);
        assert_eq!(
            got,
            set(&["mouse", "keyboard", "monitor", "charger", "earphones", "case"])
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shared_accessories_are_deduplicated() {
        let (fake, _) = FakeProvider::new(&[]);
        // "case" is recommended for both phones and watches.
        let recommended = recommender(Box::new(fake)).recommend("phone,watch").await;

        assert_eq!(recommended.len(), 5);
        assert_unique(&recommended);
    }

    #[tokio::test]
    async fn never_more_than_six() {
        let (fake, _) = FakeProvider::new(&[]);
        let recommender = recommender(Box::new(fake));
        let all = "laptop,phone,book,car,watch,headphones,tablet";
        let universe: HashSet<String> = CatalogSettings::default()
            .products
            .into_values()
            .flatten()
            .collect();

        for _ in 0..20 {
            let recommended = recommender.recommend(all).await;
            assert_eq!(recommended.len(), 6);
            assert_unique(&recommended);
            assert!(recommended.iter().all(|r| universe.contains(r)));
        }
    }

    #[tokio::test]
    async fn unknown_products_use_the_fallback() {
        let (fake, calls) = FakeProvider::new(&[("drone", &["Drone Propellers", "Drone Case"])]);
        let recommended = recommender(Box::new(fake)).recommend("Drone").await;

        let got: HashSet<String> = recommended.into_iter().collect();
        assert_eq!(got, set(&["Drone Propellers", "Drone Case"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_is_asked_once_per_unknown_item() {
        let (fake, calls) = FakeProvider::new(&[]);
        let recommended = recommender(Box::new(fake))
            .recommend("xyzzy123,laptop,plugh")
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(recommended
            .iter()
            .all(|r| set(&["mouse", "keyboard", "monitor"]).contains(r)));
    }

    #[tokio::test]
    async fn failing_fallback_contributes_nothing() {
        let recommended = recommender(Box::new(BrokenProvider))
            .recommend("xyzzy123")
            .await;
        assert_eq!(recommended, Vec::<String>::new());
    }

    #[tokio::test]
    async fn failing_fallback_keeps_catalog_results() {
        let recommended = recommender(Box::new(BrokenProvider))
            .recommend("xyzzy123,book")
            .await;
        let got: HashSet<String> = recommended.into_iter().collect();
        assert_eq!(got, set(&["pen", "notebook", "highlighter"]));
    }

    #[tokio::test]
    async fn blank_queries_recommend_nothing() {
        let (fake, calls) = FakeProvider::new(&[]);
        let recommender = recommender(Box::new(fake));
        assert!(recommender.recommend("").await.is_empty());
        assert!(recommender.recommend(" , , ").await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_errors_are_counted_by_kind() {
        let (rx, sink) = SpyMetricSink::new();
        let recommender = Recommender::new(
            Catalog::default(),
            Box::new(BrokenProvider),
            6,
            StatsdClient::from_sink("recommender-test", sink),
        );

        recommender.recommend("xyzzy123").await;

        let lines: Vec<String> = rx
            .try_iter()
            .map(|bytes| String::from_utf8(bytes).unwrap())
            .collect();
        assert!(lines
            .iter()
            .any(|l| l.starts_with("recommender-test.recommend.fallback.error:1|c")
                && l.contains("kind:status")));
        assert!(lines
            .iter()
            .any(|l| l.starts_with("recommender-test.recommend.count:0|h")));
    }

    #[test]
    fn max_results_above_six_is_rejected() {
        let settings = Settings::load_for_tests(|settings| settings.recommend.max_results = 10);
        assert!(matches!(
            Recommender::from_settings(&settings, metrics()),
            Err(SetupError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_concurrent_lookups_is_rejected() {
        let settings =
            Settings::load_for_tests(|settings| settings.recommend.max_concurrent_lookups = 0);
        assert!(matches!(
            Recommender::from_settings(&settings, metrics()),
            Err(SetupError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_settings_are_accepted() {
        let settings = Settings::load_for_tests(|_| ());
        assert!(Recommender::from_settings(&settings, metrics()).is_ok());
    }

    #[tokio::test]
    async fn result_limit_never_exceeds_six() {
        let (fake, _) = FakeProvider::new(&[]);
        let recommender = Recommender::new(
            Catalog::from(&CatalogSettings::default()),
            Box::new(fake),
            10,
            metrics(),
        );

        let recommended = recommender.recommend("laptop,phone,book").await;
        assert_eq!(recommended.len(), 6);
        assert_unique(&recommended);
    }

    #[tokio::test]
    async fn fallback_lookups_are_bounded() {
        let provider = SlowProvider::default();
        let peak = provider.peak.clone();
        let calls = provider.calls.clone();
        let recommender = Recommender::new(Catalog::default(), Box::new(provider), 6, metrics())
            .with_max_concurrent_lookups(2);
        let query: Vec<String> = (0..10).map(|i| format!("gadget{}", i)).collect();

        let recommended = recommender.recommend(&query.join(",")).await;

        assert_eq!(recommended.len(), 6);
        assert_unique(&recommended);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn sample_truncates_to_limit() {
        let candidates = set(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let picked = sample(candidates.clone(), 6, &mut rand::thread_rng());
        assert_eq!(picked.len(), 6);
        assert!(picked.iter().all(|p| candidates.contains(p)));
        assert_unique(&picked);
    }

    #[test]
    fn sample_keeps_small_sets_whole() {
        let candidates = set(&["a", "b"]);
        let picked: HashSet<String> = sample(candidates.clone(), 6, &mut rand::thread_rng())
            .into_iter()
            .collect();
        assert_eq!(picked, candidates);
    }

    #[test]
    fn sample_selection_varies() {
        let candidates: HashSet<String> = (0..20).map(|i| i.to_string()).collect();
        let mut rng = rand::thread_rng();
        let first = sample(candidates.clone(), 6, &mut rng);
        let differs = (0..50).any(|_| sample(candidates.clone(), 6, &mut rng) != first);
        assert!(differs);
    }
}
