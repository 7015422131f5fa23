use std::sync::{Arc, Mutex};

/// Accumulates values pushed by a listener; `check` drains and returns them.
#[allow(unused)]
pub fn watcher<T: Send + Sync + 'static>() -> (Box<dyn Fn(T) + Send + Sync>, Box<dyn Fn() -> Vec<T> + Send + Sync>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let accumulate = {
        let events = events.clone();
        Box::new(move |value: T| {
            events.lock().unwrap().push(value);
        })
    };

    let check = Box::new(move || {
        let events: Vec<T> = events.lock().unwrap().drain(..).collect();
        events
    });

    (accumulate, check)
}
