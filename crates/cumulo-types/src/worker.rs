//! Serial worker. All store state transitions execute FIFO on one dedicated
//! thread; callers on other threads enqueue closures and await the result.

use flume::Sender;
use futures::channel::oneshot;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use crate::prelude::*;

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// A single-threaded executor owning a state value of type `S`.
///
/// Jobs run strictly in submission order; there is no concurrency within the
/// executor, so the state needs no internal locking. A panicking job is
/// caught and logged, and the worker keeps serving subsequent jobs.
#[derive(Debug)]
pub struct Executor<S> {
	tx: Sender<Job<S>>,
}

impl<S: 'static> Executor<S> {
	/// Starts the worker thread. The state is constructed on the worker
	/// itself, so `S` does not have to be `Send`.
	pub fn spawn<F>(name: &str, init: F) -> Self
	where
		F: FnOnce() -> S + Send + 'static,
	{
		let (tx, rx) = flume::unbounded::<Job<S>>();
		let thread_name = name.to_string();

		thread::spawn(move || {
			let mut state = init();
			debug!("worker '{}' started", thread_name);
			while let Ok(job) = rx.recv() {
				if let Err(e) = catch_unwind(AssertUnwindSafe(|| job(&mut state))) {
					error!("worker '{}' caught panic: {:?}", thread_name, e);
				}
			}
			debug!("worker '{}' stopped", thread_name);
		});

		Self { tx }
	}

	/// Enqueues a closure over the state → returns a Future for the result.
	pub fn run<F, T>(&self, f: F) -> impl std::future::Future<Output = CuResult<T>>
	where
		F: FnOnce(&mut S) -> T + Send + 'static,
		T: Send + 'static,
	{
		let (res_tx, res_rx) = oneshot::channel();

		let job: Job<S> = Box::new(move |state| {
			let result = f(state);
			let _ignore = res_tx.send(result);
		});

		if self.tx.send(job).is_err() {
			error!("failed to send job to worker queue");
		}

		async move {
			res_rx.await.map_err(|_| {
				error!("worker dropped result channel (task may have panicked)");
				Error::Internal("worker task failed".into())
			})
		}
	}

	/// Like `run`, but flattens `CuResult<CuResult<T>>` into `CuResult<T>`.
	/// Use when the closure itself returns `CuResult<T>`.
	pub fn try_run<F, T>(&self, f: F) -> impl std::future::Future<Output = CuResult<T>>
	where
		F: FnOnce(&mut S) -> CuResult<T> + Send + 'static,
		T: Send + 'static,
	{
		let fut = self.run(f);
		async move { fut.await? }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;

	#[test]
	fn test_jobs_run_in_submission_order() {
		let executor = Executor::spawn("test", Vec::<u32>::new);

		for i in 0..100 {
			let _ = executor.run(move |state| state.push(i));
		}
		let seen = block_on(executor.run(|state| state.clone())).unwrap();

		assert_eq!(seen, (0..100).collect::<Vec<_>>());
	}

	#[test]
	fn test_results_flow_back() {
		let executor = Executor::spawn("test", || 40u32);
		let result = block_on(executor.run(|state| *state + 2)).unwrap();
		assert_eq!(result, 42);
	}

	#[test]
	fn test_panic_does_not_kill_worker() {
		let executor = Executor::spawn("test", || ());
		let panicking = executor.run(|_| {
			panic!("boom");
		});
		assert!(block_on(panicking).is_err());

		let ok = block_on(executor.run(|_| 7)).unwrap();
		assert_eq!(ok, 7);
	}

	#[test]
	fn test_try_run_flattens_errors() {
		let executor = Executor::spawn("test", || ());
		let err = block_on(executor.try_run(|_| -> CuResult<()> { Err(Error::NotFound) }));
		assert!(matches!(err, Err(Error::NotFound)));
	}
}

// vim: ts=4
