//! Tools to help testing metrics

use cadence::{SpyMetricSink, StatsdClient};
use crossbeam_channel::Receiver;
use statsd_parser::Message;

/// Helper to collect metrics during tests, and make assertions about them.
pub struct MetricsWatcher {
    /// Crossbeam channel that receives metrics lines as bytes.
    rx: Receiver<Vec<u8>>,

    /// Metrics received by the watcher from [`rx`](Self::rx).
    messages: Vec<Message>,

    /// Every line received, including those the parser does not understand.
    lines: Vec<String>,
}

impl MetricsWatcher {
    /// Make a new metrics watcher, attach it to a [`StatsdClient`] and return both.
    pub fn new_with_client() -> (Self, StatsdClient) {
        let (rx, spy_sink) = SpyMetricSink::new();
        let metrics_client = StatsdClient::from_sink("", spy_sink);
        let metrics_watcher = Self {
            rx,
            messages: vec![],
            lines: vec![],
        };

        (metrics_watcher, metrics_client)
    }

    /// Consume any waiting events from `rx` and parse them as metrics. Lines
    /// the parser does not understand are skipped.
    fn process_events(&mut self) {
        for bytes in self.rx.try_iter() {
            let line = String::from_utf8(bytes).expect("Invalid UTF8 in metric message");
            if let Ok(message) = statsd_parser::parse(line.clone()) {
                self.messages.push(message);
            }
            self.lines.push(line);
        }
    }

    /// Test if any raw metric line this watcher received matches `predicate`.
    pub fn has_line<F>(&mut self, predicate: F) -> bool
    where
        F: FnMut(&String) -> bool,
    {
        self.process_events();
        self.lines.iter().any(predicate)
    }

    /// Get a list of all the metrics seen by this watcher, primarily for debugging.
    pub fn all_messages(&mut self) -> &[Message] {
        self.process_events();
        self.messages.as_slice()
    }

    /// Test if any metric this watcher received matches `predicate`.
    pub fn has<F>(&mut self, predicate: F) -> bool
    where
        F: FnMut(&Message) -> bool,
    {
        self.all_messages().iter().any(predicate)
    }

    /// Count the metrics this watcher received with the given name.
    pub fn count_named(&mut self, name: &str) -> usize {
        self.all_messages()
            .iter()
            .filter(|msg| msg.name == name)
            .count()
    }

    /// Test if any metric this watcher received was a histogram with the given name and value.
    ///
    /// Values are compared by taking the absolute difference between them, and
    /// checking if it less than an epsilon of 0.0001.
    pub fn has_histogram(&mut self, name: &str, expected_value: f64) -> bool {
        self.has(|msg| {
            msg.name == name
                && match &msg.metric {
                    statsd_parser::Metric::Histogram(histogram) => {
                        (histogram.value - expected_value).abs() <= 0.0001
                    }
                    _ => false,
                }
        })
    }
}
