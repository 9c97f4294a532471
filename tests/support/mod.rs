#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chat_backend::ChatBackend;
use chat_backend_mock::MockBackend;
use notebook_stream::{ChatOptions, SessionController, SessionEvent, SessionObserver};

pub const WAIT: Duration = Duration::from_secs(5);

/// Records every session event in arrival order.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<SessionEvent>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<SessionEvent> {
        lock_unpoisoned(&self.events).clone()
    }

    pub fn for_session(&self, session_id: u64) -> Vec<SessionEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.session_id() == session_id)
            .collect()
    }
}

impl SessionObserver for EventLog {
    fn on_event(&self, event: SessionEvent) {
        lock_unpoisoned(&self.events).push(event);
    }
}

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub controller: Arc<SessionController>,
    pub log: Arc<EventLog>,
}

pub fn harness(options: ChatOptions) -> Harness {
    let backend = Arc::new(MockBackend::with_token_delay(Duration::ZERO));
    let log = Arc::new(EventLog::default());
    let controller = SessionController::new_with_observer(
        Arc::clone(&backend) as Arc<dyn ChatBackend>,
        options,
        Arc::clone(&log) as Arc<dyn SessionObserver>,
    );

    Harness {
        backend,
        controller,
        log,
    }
}

pub fn plain_options() -> ChatOptions {
    ChatOptions::default()
        .with_translate_to_english(false)
        .with_auto_translate_responses(false)
}

pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }

        thread::sleep(Duration::from_millis(5));
    }

    predicate()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
