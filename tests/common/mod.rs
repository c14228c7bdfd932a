use diffwatch::event::{ModificationEvent, Observer};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// How long to wait for the OS to deliver a watch notification.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Small sleep to let a freshly registered watch settle, and to let trailing
/// duplicate notifications arrive before counting events.
pub const SETTLE: Duration = Duration::from_millis(300);

/// Observer that records every event it receives.
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ModificationEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ModificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl Observer for CollectingObserver {
    fn file_modified(&self, event: &ModificationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Poll until `predicate` holds or `timeout` passes.
pub fn wait_for(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}
