use tracing::level_filters::LevelFilter;
use tracing_subscriber::Registry;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

/// Manual manage the logging behavior of fieldfuzz
#[derive(Clone)]
pub struct Logger {
    level_filter: LevelFilter,
    // None if another subscriber was already installed
    reload_handle: Option<reload::Handle<LevelFilter, Registry>>,
}

fn level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

impl Logger {
    /// Installs the global `tracing` subscriber printing INFO (or DEBUG if `verbose`)
    /// and above. A second call leaves the installed subscriber in place.
    #[must_use]
    pub fn init(verbose: bool) -> Self {
        let level_filter = level(verbose);
        let (filter, reload_handle) = reload::Layer::new(level_filter);

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::Layer::new())
            .try_init()
            .is_ok();

        Self {
            level_filter,
            reload_handle: installed.then_some(reload_handle),
        }
    }

    /// Changes the log level at runtime
    pub fn set_verbose(&mut self, verbose: bool) {
        self.level_filter = level(verbose);
        if let Some(handle) = &self.reload_handle {
            let level_filter = self.level_filter;
            let _ = handle.modify(|filter| *filter = level_filter);
        }
    }

    /// Current log level
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level_filter
    }
}
