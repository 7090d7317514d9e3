//! Collective communication between sweep workers
//!
//! Workers form a fixed-size group and only talk to each other through the
//! collectives below. All data crossing worker boundaries is numeric.
//!
//! Two implementations ship with the crate:
//! - [`SerialComm`]: a group of one, the default when no group is supplied.
//! - [`LocalGroup`]: `n` workers in one process, each driven by its own
//!   thread. Slots in shared memory stand in for message passing and a
//!   barrier separates the write and read phases of every collective.

use std::sync::{Arc, Barrier, Mutex};

use crate::error::{CommError, Result, ShapeError};

/// Collective operations used by the sweep engine.
///
/// Every worker of a group must call the same collectives in the same order.
/// A worker that never arrives stalls the rest of the group.
pub trait Communicator: Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Rank 0 builds, gathers and persists global state
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    fn barrier(&self) -> Result<()>;

    /// Overwrite `buf` on every worker with the contents of `buf` on `root`.
    /// Buffers must have the same length everywhere.
    fn broadcast_f64(&self, buf: &mut [f64], root: usize) -> Result<()>;

    /// Every worker learns every worker's `count`, in rank order
    fn all_gather_count(&self, count: usize) -> Result<Vec<usize>>;

    /// Concatenate each worker's `send` in rank order on `root`.
    ///
    /// `counts[r]` is the number of elements rank `r` contributes. Returns
    /// `Some` on the root and `None` elsewhere.
    fn gather_varcount_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        root: usize,
    ) -> Result<Option<Vec<f64>>>;

    /// Integer flavour of [`Communicator::gather_varcount_f64`]
    fn gather_varcount_i64(
        &self,
        send: &[i64],
        counts: &[usize],
        root: usize,
    ) -> Result<Option<Vec<i64>>>;
}

fn check_root(root: usize, size: usize) -> Result<()> {
    if root >= size {
        return Err(CommError::InvalidRoot { root, size }.into());
    }
    Ok(())
}

fn check_contribution(send_len: usize, counts: &[usize], rank: usize, size: usize) -> Result<()> {
    if counts.len() != size {
        return Err(ShapeError::BufferMismatch {
            context: "gather counts",
            expected: size,
            actual: counts.len(),
        }
        .into());
    }
    if counts[rank] != send_len {
        return Err(ShapeError::BufferMismatch {
            context: "gather send buffer",
            expected: counts[rank],
            actual: send_len,
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// Serial
// ============================================================================

/// Group of exactly one worker
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn broadcast_f64(&self, _buf: &mut [f64], root: usize) -> Result<()> {
        check_root(root, 1)
    }

    fn all_gather_count(&self, count: usize) -> Result<Vec<usize>> {
        Ok(vec![count])
    }

    fn gather_varcount_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        root: usize,
    ) -> Result<Option<Vec<f64>>> {
        check_root(root, 1)?;
        check_contribution(send.len(), counts, 0, 1)?;
        Ok(Some(send.to_vec()))
    }

    fn gather_varcount_i64(
        &self,
        send: &[i64],
        counts: &[usize],
        root: usize,
    ) -> Result<Option<Vec<i64>>> {
        check_root(root, 1)?;
        check_contribution(send.len(), counts, 0, 1)?;
        Ok(Some(send.to_vec()))
    }
}

// ============================================================================
// In-process group
// ============================================================================

#[derive(Debug, Clone, Default)]
enum Payload {
    #[default]
    Empty,
    Count(usize),
    F64(Vec<f64>),
    I64(Vec<i64>),
}

/// Element types that can travel through the shared slots
trait SlotData: Copy + Send + 'static {
    fn wrap(data: Vec<Self>) -> Payload;
    fn unwrap(payload: &Payload) -> Option<&[Self]>;
}

impl SlotData for f64 {
    fn wrap(data: Vec<Self>) -> Payload {
        Payload::F64(data)
    }

    fn unwrap(payload: &Payload) -> Option<&[Self]> {
        match payload {
            Payload::F64(v) => Some(v),
            _ => None,
        }
    }
}

impl SlotData for i64 {
    fn wrap(data: Vec<Self>) -> Payload {
        Payload::I64(data)
    }

    fn unwrap(payload: &Payload) -> Option<&[Self]> {
        match payload {
            Payload::I64(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Payload>>,
}

/// Factory for the members of an in-process worker group
#[derive(Debug)]
pub struct LocalGroup;

impl LocalGroup {
    /// Create the `size` member handles of a new group, in rank order
    #[allow(clippy::new_ret_no_self)]
    pub fn new(size: usize) -> Vec<LocalComm> {
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Payload::Empty; size]),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

/// One worker's handle on a [`LocalGroup`]
#[derive(Debug)]
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalComm {
    fn write_slot(&self, payload: Payload) -> Result<()> {
        let mut slots = self.shared.slots.lock().map_err(|_| CommError::Poisoned)?;
        slots[self.rank] = payload;
        Ok(())
    }

    fn read_slots<T>(&self, read: impl FnOnce(&[Payload]) -> Result<T>) -> Result<T> {
        let slots = self.shared.slots.lock().map_err(|_| CommError::Poisoned)?;
        read(&slots)
    }

    /// Write `payload`, wait for the group, run `read`, wait again.
    ///
    /// Both barriers are always reached, even when a step fails locally, so a
    /// shape error on one worker does not strand the others.
    fn exchange<T>(
        &self,
        payload: Result<Payload>,
        read: impl FnOnce(&[Payload]) -> Result<T>,
    ) -> Result<T> {
        // A failed contribution clears the slot so the root never reads stale data
        let written = match payload {
            Ok(p) => self.write_slot(p),
            Err(e) => self.write_slot(Payload::Empty).and(Err(e)),
        };
        self.shared.barrier.wait();
        let result = written.and_then(|()| self.read_slots(read));
        self.shared.barrier.wait();
        result
    }

    fn gather_varcount<T: SlotData>(
        &self,
        send: &[T],
        counts: &[usize],
        root: usize,
    ) -> Result<Option<Vec<T>>> {
        let size = self.shared.size;
        let payload = check_root(root, size)
            .and_then(|()| check_contribution(send.len(), counts, self.rank, size))
            .map(|()| T::wrap(send.to_vec()));
        let is_root = self.rank == root;

        self.exchange(payload, |slots| {
            if !is_root {
                return Ok(None);
            }
            let total: usize = counts.iter().sum();
            let mut recv = Vec::with_capacity(total);
            for (rank, slot) in slots.iter().enumerate() {
                let data = T::unwrap(slot).ok_or(ShapeError::BufferMismatch {
                    context: "gather receive",
                    expected: counts[rank],
                    actual: 0,
                })?;
                if data.len() != counts[rank] {
                    return Err(ShapeError::BufferMismatch {
                        context: "gather receive",
                        expected: counts[rank],
                        actual: data.len(),
                    }
                    .into());
                }
                recv.extend_from_slice(data);
            }
            Ok(Some(recv))
        })
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<()> {
        self.shared.barrier.wait();
        Ok(())
    }

    fn broadcast_f64(&self, buf: &mut [f64], root: usize) -> Result<()> {
        let is_root = self.rank == root;
        let payload = check_root(root, self.shared.size).map(|()| {
            if is_root {
                Payload::F64(buf.to_vec())
            } else {
                Payload::Empty
            }
        });
        let received = self.exchange(payload, |slots| {
            if is_root {
                return Ok(None);
            }
            let data = match &slots[root] {
                Payload::F64(data) => data.clone(),
                _ => Vec::new(),
            };
            Ok(Some(data))
        })?;

        if let Some(data) = received {
            if data.len() != buf.len() {
                return Err(ShapeError::BufferMismatch {
                    context: "broadcast",
                    expected: buf.len(),
                    actual: data.len(),
                }
                .into());
            }
            buf.copy_from_slice(&data);
        }
        Ok(())
    }

    fn all_gather_count(&self, count: usize) -> Result<Vec<usize>> {
        self.exchange(Ok(Payload::Count(count)), |slots| {
            slots
                .iter()
                .map(|slot| match slot {
                    Payload::Count(n) => Ok(*n),
                    _ => Err(CommError::Poisoned.into()),
                })
                .collect()
        })
    }

    fn gather_varcount_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        root: usize,
    ) -> Result<Option<Vec<f64>>> {
        self.gather_varcount(send, counts, root)
    }

    fn gather_varcount_i64(
        &self,
        send: &[i64],
        counts: &[usize],
        root: usize,
    ) -> Result<Option<Vec<i64>>> {
        self.gather_varcount(send, counts, root)
    }
}

/// Share the coordinator's outcome of a rank-0-only step with the group.
///
/// Every rank must call this. Non-coordinators get
/// [`CommError::CoordinatorFailed`] when the coordinator's `outcome` is an
/// error, and their own `outcome` otherwise. The broadcast also acts as a
/// barrier.
pub fn coordinator_outcome<T>(comm: &dyn Communicator, outcome: Result<T>) -> Result<T> {
    if comm.size() == 1 {
        return outcome;
    }
    let mut flag = [if outcome.is_ok() { 1.0 } else { 0.0 }];
    comm.broadcast_f64(&mut flag, 0)?;
    if !comm.is_coordinator() && flag[0] == 0.0 {
        return Err(CommError::CoordinatorFailed.into());
    }
    outcome
}

/// Run `worker` once per rank of a fresh `size`-worker group, each on its
/// own scoped thread, and return the results in rank order.
///
/// A panicking worker is re-raised on the calling thread once the others
/// have finished.
pub fn run_local_group<T, F>(size: usize, worker: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalComm) -> T + Sync,
{
    let comms = LocalGroup::new(size);
    std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .iter()
            .map(|comm| {
                let worker = &worker;
                scope.spawn(move || worker(comm))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepError;

    #[test]
    fn test_serial_gather_is_identity() {
        let comm = SerialComm;
        let out = comm.gather_varcount_f64(&[1.0, 2.0], &[2], 0).unwrap();
        assert_eq!(out, Some(vec![1.0, 2.0]));
        assert_eq!(comm.all_gather_count(5).unwrap(), vec![5]);
    }

    #[test]
    fn test_serial_rejects_bad_root_and_counts() {
        let comm = SerialComm;
        assert!(matches!(
            comm.broadcast_f64(&mut [0.0], 1),
            Err(SweepError::Comm(CommError::InvalidRoot { root: 1, size: 1 }))
        ));
        assert!(matches!(
            comm.gather_varcount_i64(&[1, 2, 3], &[2], 0),
            Err(SweepError::Shape(ShapeError::BufferMismatch { .. }))
        ));
    }

    #[test]
    fn test_local_broadcast() {
        let results = run_local_group(4, |comm| {
            let mut buf = if comm.is_coordinator() {
                vec![1.0, 2.0, 3.0]
            } else {
                vec![0.0; 3]
            };
            comm.broadcast_f64(&mut buf, 0).unwrap();
            buf
        });
        for buf in results {
            assert_eq!(buf, vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_local_broadcast_size_mismatch() {
        let results = run_local_group(2, |comm| {
            let mut buf = vec![0.0; 2 + comm.rank()];
            comm.broadcast_f64(&mut buf, 0)
        });
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(SweepError::Shape(ShapeError::BufferMismatch {
                context: "broadcast",
                ..
            }))
        ));
    }

    #[test]
    fn test_local_gather_uneven_counts() {
        let results = run_local_group(3, |comm| {
            let counts = comm.all_gather_count(comm.rank() + 1).unwrap();
            let send: Vec<i64> = (0..=comm.rank()).map(|i| (comm.rank() * 10 + i) as i64).collect();
            (counts.clone(), comm.gather_varcount_i64(&send, &counts, 0).unwrap())
        });
        assert_eq!(results[0].0, vec![1, 2, 3]);
        assert_eq!(results[0].1, Some(vec![0, 10, 11, 20, 21, 22]));
        assert_eq!(results[1].1, None);
        assert_eq!(results[2].1, None);
    }

    #[test]
    fn test_local_gather_wrong_contribution_does_not_hang() {
        let results = run_local_group(2, |comm| {
            let counts = vec![1, 1];
            let send = vec![1.0; comm.rank() + 1];
            comm.gather_varcount_f64(&send, &counts, 0)
        });
        assert!(results[0].is_err());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_coordinator_failure_reaches_every_rank() {
        let results = run_local_group(3, |comm| {
            let outcome = if comm.is_coordinator() {
                Err(CommError::InvalidRoot { root: 9, size: 3 }.into())
            } else {
                Ok(comm.rank())
            };
            coordinator_outcome(comm, outcome)
        });
        assert!(matches!(
            results[0],
            Err(SweepError::Comm(CommError::InvalidRoot { .. }))
        ));
        for r in &results[1..] {
            assert!(matches!(r, Err(SweepError::Comm(CommError::CoordinatorFailed))));
        }

        let ok = run_local_group(2, |comm| coordinator_outcome(comm, Ok(comm.rank())));
        assert_eq!(ok[0].as_ref().ok(), Some(&0));
        assert_eq!(ok[1].as_ref().ok(), Some(&1));
    }

    #[test]
    fn test_consecutive_collectives_reuse_slots() {
        let results = run_local_group(3, |comm| {
            let mut out = Vec::new();
            for round in 0..5 {
                let counts = comm.all_gather_count(1).unwrap();
                let gathered = comm
                    .gather_varcount_f64(&[(round * 100 + comm.rank()) as f64], &counts, 0)
                    .unwrap();
                comm.barrier().unwrap();
                out.push(gathered);
            }
            out
        });
        for (round, gathered) in results[0].iter().enumerate() {
            let base = (round * 100) as f64;
            assert_eq!(gathered, &Some(vec![base, base + 1.0, base + 2.0]));
        }
    }
}
