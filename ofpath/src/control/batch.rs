// ofpath: Planning Paths and Compiling them into OpenFlow Rules
// Copyright (C) 2021  The ofpath developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Parallel installation and removal of rule batches.

use super::{ControlError, ControlPlane};
use crate::flows::{FlowRule, RuleId};

use log::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Options of a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum time for the whole batch. Calls which have not returned when it expires are
    /// treated as failed.
    pub timeout: Duration,
    /// Number of worker threads
    pub parallelism: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), parallelism: num_cpus::get() }
    }
}

/// # Batch Failure
/// Returned when a batch could not be completed. `leftover` contains every rule which may still be
/// installed on a switch: for an install, the rules which could not be rolled back, and for a
/// removal, the rules which could not be removed.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// The first error that occurred
    pub error: ControlError,
    /// Rules that may still be installed
    pub leftover: Vec<RuleId>,
}

/// Result of running a batch, referencing the items by their index.
#[derive(Debug, Default)]
struct Outcome {
    done: Vec<usize>,
    failed: Vec<(usize, ControlError)>,
    unreported: Vec<usize>,
    timed_out: bool,
    /// All workers stopped before every item was reported, e.g., because one of them panicked.
    terminated: bool,
}

/// Message sent from the workers. `None` means that the item was skipped.
type Report = (usize, Option<Result<(), ControlError>>);

/// Run `work` on every item, using `parallelism` threads. If `stop_on_error` is set, no new item
/// is started after the first failure. When the timeout expires, the `expired` flag passed to
/// `work` is set, and all items that were started but have not reported yet are returned as
/// `unreported`. If the workers terminate before every item was reported, all missing items are
/// returned as `unreported`, and `terminated` is set.
fn run<T, F>(items: Vec<T>, options: &BatchOptions, stop_on_error: bool, work: F) -> Outcome
where
    T: Send + Sync + 'static,
    F: Fn(&T, &AtomicBool) -> Result<(), ControlError> + Send + Sync + 'static,
{
    let mut outcome = Outcome::default();
    if items.is_empty() {
        return outcome;
    }

    let n = items.len();
    let items = Arc::new(items);
    let work = Arc::new(work);
    let next = Arc::new(AtomicUsize::new(0));
    let abort = Arc::new(AtomicBool::new(false));
    let expired = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel::<Report>();

    let n_threads = options.parallelism.max(1).min(n);
    trace!("Spawning {} workers for {} items", n_threads, n);
    let handles = (0..n_threads)
        .map(|_| {
            let items = items.clone();
            let work = work.clone();
            let next = next.clone();
            let abort = abort.clone();
            let expired = expired.clone();
            let tx = tx.clone();
            thread::spawn(move || loop {
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= items.len() {
                    break;
                }
                let result = if abort.load(Ordering::SeqCst) {
                    None
                } else {
                    let result = work(&items[i], &expired);
                    if stop_on_error && result.is_err() {
                        abort.store(true, Ordering::SeqCst);
                    }
                    Some(result)
                };
                if tx.send((i, result)).is_err() {
                    break;
                }
            })
        })
        .collect::<Vec<_>>();
    drop(tx);

    let deadline = Instant::now() + options.timeout;
    let mut reported: HashSet<usize> = HashSet::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((i, result)) => {
                reported.insert(i);
                match result {
                    Some(Ok(())) => outcome.done.push(i),
                    Some(Err(e)) => outcome.failed.push((i, e)),
                    None => {}
                }
                if reported.len() == n {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                outcome.timed_out = true;
                break;
            }
        }
    }

    if outcome.timed_out {
        // order matters: workers which fetch an index after this point see the abort flag.
        expired.store(true, Ordering::SeqCst);
        abort.store(true, Ordering::SeqCst);
        while let Ok((i, result)) = rx.try_recv() {
            reported.insert(i);
            match result {
                Some(Ok(())) => outcome.done.push(i),
                Some(Err(e)) => outcome.failed.push((i, e)),
                None => {}
            }
        }
        let started = next.load(Ordering::SeqCst).min(n);
        outcome.unreported = (0..started).filter(|i| !reported.contains(i)).collect();
        // the remaining workers are left running. They stop after their current call.
    } else {
        if reported.len() < n {
            error!("Batch workers terminated with {} items unreported", n - reported.len());
            outcome.terminated = true;
            outcome.unreported = (0..n).filter(|i| !reported.contains(i)).collect();
        }
        for handle in handles {
            if handle.join().is_err() {
                error!("A batch worker panicked");
            }
        }
    }

    outcome.done.sort_unstable();
    outcome.failed.sort_by_key(|(i, _)| *i);
    outcome
}

/// # Install a Batch
///
/// Install all rules in parallel. The batch is all-or-nothing: if any install fails (or the batch
/// times out), no new install is started, and every rule of the batch which was (or may have been)
/// installed is removed again before the error is returned. Rules that could not be removed during
/// this rollback are returned in [`BatchFailure::leftover`].
///
/// A rule whose install only completes after the timeout is removed by its worker right away.
pub fn install_all<C: ControlPlane + 'static>(
    plane: &Arc<C>,
    rules: &[FlowRule],
    options: &BatchOptions,
) -> Result<(), BatchFailure> {
    if rules.is_empty() {
        return Ok(());
    }
    info!("Installing {} rules", rules.len());

    let worker_plane = plane.clone();
    let outcome = run(rules.to_vec(), options, true, move |rule: &FlowRule, expired| {
        worker_plane.install(rule)?;
        if expired.load(Ordering::SeqCst) {
            warn!("Install of {} completed after the timeout, removing it", rule.id);
            if let Err(e) = worker_plane.remove(&rule.id) {
                error!("Could not remove late rule {}: {}", rule.id, e);
            }
        }
        Ok(())
    });

    let stuck = rules[outcome.unreported.first().copied().unwrap_or(0)].switch();
    let error = match (outcome.failed.first(), outcome.timed_out, outcome.terminated) {
        (Some((_, e)), _, _) => e.clone(),
        (None, true, _) => timeout_error(stuck, options),
        (None, false, true) => terminated_error(stuck),
        (None, false, false) => {
            debug!("Installed {} rules", outcome.done.len());
            return Ok(());
        }
    };

    warn!("Install failed ({}), rolling back the batch", error);
    let rollback: Vec<RuleId> = outcome
        .done
        .iter()
        .chain(outcome.unreported.iter())
        .map(|i| rules[*i].id.clone())
        .collect();
    let leftover = match remove_all(plane, &rollback, options) {
        Ok(()) => Vec::new(),
        Err(failure) => {
            error!("Rollback left {} rules behind: {}", failure.leftover.len(), failure.error);
            failure.leftover
        }
    };
    Err(BatchFailure { error, leftover })
}

/// # Remove a Batch
///
/// Remove all rules in parallel. In contrast to [`install_all`], a failure does not stop the other
/// removals. If any removal fails or the batch times out, the first error is returned together
/// with every rule that was not confirmed to be removed.
pub fn remove_all<C: ControlPlane + 'static>(
    plane: &Arc<C>,
    rules: &[RuleId],
    options: &BatchOptions,
) -> Result<(), BatchFailure> {
    if rules.is_empty() {
        return Ok(());
    }
    info!("Removing {} rules", rules.len());

    let worker_plane = plane.clone();
    let outcome =
        run(rules.to_vec(), options, false, move |rule: &RuleId, _| worker_plane.remove(rule));

    if outcome.failed.is_empty() && !outcome.timed_out && !outcome.terminated {
        debug!("Removed {} rules", outcome.done.len());
        return Ok(());
    }

    let done: HashSet<usize> = outcome.done.iter().copied().collect();
    let leftover: Vec<RuleId> =
        (0..rules.len()).filter(|i| !done.contains(i)).map(|i| rules[i].clone()).collect();
    let error = match outcome.failed.into_iter().next() {
        Some((_, e)) => e,
        None => {
            let switch = leftover.first().map(|r| r.switch.as_str()).unwrap_or("?");
            if outcome.timed_out {
                timeout_error(switch, options)
            } else {
                terminated_error(switch)
            }
        }
    };
    warn!("Removal failed ({}), {} rules left behind", error, leftover.len());
    Err(BatchFailure { error, leftover })
}

fn timeout_error(switch: &str, options: &BatchOptions) -> ControlError {
    ControlError::channel(switch, format!("no answer within {:?}", options.timeout))
}

fn terminated_error(switch: &str) -> ControlError {
    ControlError::channel(switch, "batch worker terminated")
}
