//! Uniform dispatch for user-supplied stream callbacks (process stdout/
//! stderr/pty chunks, code interpreter stdout/stderr/result/error).
//!
//! A `Handler<T>` trait with one `dispatch` method, backed by two
//! implementations chosen per façade. The blocking façade always uses
//! [`Inline`]; the cooperative façade uses [`Inline`] for plain closures and
//! [`Spawned`] for closures returning a future, so a slow user callback never
//! blocks the frame demultiplexer (`tokio::spawn` preserves the order in
//! which handlers are *started*, even though completion may interleave).

use std::future::Future;
use std::sync::Arc;

/// Something that can receive a stream of `T` values, one per frame.
pub trait Handler<T>: Send + Sync {
    fn dispatch(&self, value: T);
}

/// Runs the callback synchronously on the caller's task/thread. Used by the
/// blocking façade unconditionally, and by the cooperative façade for plain
/// (non-async) closures.
pub struct Inline<F>(pub F);

impl<T, F> Handler<T> for Inline<F>
where
    F: Fn(T) + Send + Sync,
    T: Send,
{
    fn dispatch(&self, value: T) {
        (self.0)(value);
    }
}

/// Runs the callback as a spawned task, so a slow or suspending handler
/// never holds up the demultiplexer loop. Only meaningful on a
/// multi-threaded or current-thread tokio runtime; the cooperative façade is
/// the only caller.
pub struct Spawned<F> {
    pub make_future: F,
}

impl<T, F, Fut> Handler<T> for Spawned<F>
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
    T: Send,
{
    fn dispatch(&self, value: T) {
        let fut = (self.make_future)(value);
        tokio::spawn(fut);
    }
}

/// A boxed handler, used where the concrete callback type would otherwise
/// need to be threaded through every signature in the process/code
/// interpreter modules.
pub type BoxHandler<T> = Arc<dyn Handler<T>>;

/// No-op handler for callers who don't care about a particular channel
/// (e.g. `wait(None, None, None)`).
pub struct Noop;

impl<T: Send> Handler<T> for Noop {
    fn dispatch(&self, _value: T) {}
}

/// Helper so callers can write `handler::inline(|s: String| println!("{s}"))`
/// without naming `Inline` explicitly.
pub fn inline<T, F>(f: F) -> Arc<dyn Handler<T>>
where
    F: Fn(T) + Send + Sync + 'static,
    T: Send + 'static,
{
    Arc::new(Inline(f))
}

/// Helper mirroring [`inline`] for task-returning closures.
pub fn spawned<T, F, Fut>(f: F) -> Arc<dyn Handler<T>>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    T: Send + 'static,
{
    Arc::new(Spawned { make_future: f })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn inline_handler_runs_synchronously() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let seen = Arc::clone(&seen);
            inline(move |v: i32| seen.lock().expect("lock").push(v))
        };
        handler.dispatch(1);
        handler.dispatch(2);
        assert_eq!(*seen.lock().expect("lock"), vec![1, 2]);
    }

    #[tokio::test]
    async fn spawned_handler_eventually_runs() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let seen = Arc::clone(&seen);
            spawned(move |v: i32| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().expect("lock").push(v);
                }
            })
        };
        handler.dispatch(7);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(*seen.lock().expect("lock"), vec![7]);
    }
}
