//! K-way chronological merge of worker rings into one output file.
//!
//! The output thread runs a tournament tree over all rings: each internal
//! node holds the index of the queue whose current head message is oldest.
//! Messages stay in their ring slot until written, so the merge never
//! copies a record. The tournament only runs "clean" while every ring has
//! a head message; when some ring is empty the tree is *stalled*, and only
//! messages older than [`LLQ_MAX_AGE`] are flushed until the ring catches
//! up. Two records farther apart than `LLQ_MAX_AGE` are therefore always
//! written in timestamp order; inversions inside the window are bounded by
//! each ring's internal FIFO order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::llq::{LlqQueue, Timestamp, LLQ_MAX_AGE};
use crate::error::{OutputError, Result};
use crate::format::format_event_start;

/// Sentinel for tree slots beyond the real queue count.
const NO_QUEUE: i32 = -1;

/// Rotating output file owned by the output thread.
pub struct OutputFile {
    path: PathBuf,
    file: BufWriter<File>,
    max_records: u64,
    record_countdown: u64,
    file_num: u32,
}

impl OutputFile {
    /// Open the output file. `max_records == 0` disables rotation.
    pub fn create(path: impl Into<PathBuf>, max_records: u64) -> Result<Self> {
        let path = path.into();
        let mut file_num = 0;
        let (file, record_countdown) = Self::open_target(&path, max_records, &mut file_num)?;
        Ok(OutputFile {
            path,
            file,
            max_records,
            record_countdown,
            file_num,
        })
    }

    fn open_target(
        path: &std::path::Path,
        max_records: u64,
        file_num: &mut u32,
    ) -> Result<(BufWriter<File>, u64)> {
        let (target, countdown) = if max_records > 0 {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs();
            let stamp: String = format_event_start(now, 0)
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            let name = format!("{}-{:x}-{}", path.display(), file_num, &stamp[..14]);
            *file_num += 1;
            (PathBuf::from(name), max_records)
        } else {
            (path.to_path_buf(), u64::MAX)
        };

        let file = File::create(&target).map_err(|e| OutputError::Open {
            path: target.display().to_string(),
            source: e,
        })?;
        Ok((BufWriter::new(file), countdown))
    }

    fn rotate(&mut self) -> Result<()> {
        self.file.flush().ok();
        let (file, countdown) =
            Self::open_target(&self.path, self.max_records, &mut self.file_num)?;
        self.file = file;
        self.record_countdown = countdown;
        Ok(())
    }

    fn after_record(&mut self) -> Result<()> {
        self.record_countdown -= 1;
        if self.record_countdown == 0 {
            self.rotate()?;
        }
        Ok(())
    }
}

/// Tournament-tree merge writer.
pub struct OutputWriter {
    queues: Vec<Arc<LlqQueue>>,
    ridx: Vec<usize>,
    tree: Vec<i32>,
    qp2: usize,
    stalled: bool,
    out: OutputFile,
    stop: Arc<AtomicBool>,
    records_written: u64,
}

impl OutputWriter {
    pub fn new(
        queues: Vec<Arc<LlqQueue>>,
        out: OutputFile,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        if queues.is_empty() {
            return Err(OutputError::RingAllocation { requested: 0 }.into());
        }
        // smallest power of two >= queue count
        let mut qp2 = 2;
        while qp2 < queues.len() {
            qp2 *= 2;
        }
        let ridx = vec![0usize; queues.len()];
        let tree = vec![NO_QUEUE; qp2 - 1];
        Ok(OutputWriter {
            queues,
            ridx,
            tree,
            qp2,
            stalled: false,
            out,
            stop,
            records_written: 0,
        })
    }

    /// Run the merge loop on a dedicated thread.
    pub fn spawn(self) -> JoinHandle<Result<u64>> {
        std::thread::Builder::new()
            .name("flowprint-output".into())
            .spawn(move || self.run())
            .expect("failed to spawn output thread")
    }

    /// Drain all rings until the stop flag is set and every ring is empty.
    /// Returns the number of records written.
    pub fn run(mut self) -> Result<u64> {
        loop {
            // rebuild the whole tree; pairs share a tournament run
            self.stalled = false;
            for q in (0..self.qp2).step_by(2) {
                self.run_tourn_for_queue(q);
            }

            // fast path: pop winners while every queue has a head message
            while !self.stalled {
                let wq = self.tree[0];
                if self.head_ts(wq).is_some() {
                    self.write_winner(wq)?;
                    self.run_tourn_for_queue(wq as usize);
                } else {
                    break;
                }
            }

            // stalled: release only messages past the age bound
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs();
            let cutoff = Timestamp::new(now.saturating_sub(LLQ_MAX_AGE), 0);

            let mut done = false;
            loop {
                let wq = self.tree[0];
                match self.head_ts(wq) {
                    None => {
                        // even the winning queue is empty; all queues are
                        if self.stop.load(Ordering::Acquire) {
                            done = true;
                        }
                        break;
                    }
                    Some(ts) if ts < cutoff => {
                        self.write_winner(wq)?;
                        self.run_tourn_for_queue(wq as usize);
                    }
                    Some(_) => break,
                }
            }
            if done {
                break;
            }

            std::thread::sleep(Duration::from_micros(1));
        }

        self.out.file.flush()?;
        Ok(self.records_written)
    }

    fn head_ts(&self, q: i32) -> Option<Timestamp> {
        if q < 0 || q as usize >= self.queues.len() {
            return None;
        }
        self.queues[q as usize].peek_ts(self.ridx[q as usize])
    }

    fn write_winner(&mut self, wq: i32) -> Result<()> {
        let q = wq as usize;
        self.queues[q].consume_into(self.ridx[q], &mut self.out.file)?;
        self.ridx[q] = self.ridx[q].wrapping_add(1);
        self.records_written += 1;
        self.out.after_record()
    }

    /// True when queue `ql` beats queue `qr` (older head message wins;
    /// ties go to the lower index). Marks the tree stalled when a live
    /// queue has no head message.
    fn queue_less(&mut self, ql: i32, qr: i32) -> bool {
        let l_ts = self.head_ts(ql);
        let r_ts = self.head_ts(qr);

        // a stall must be noticed on both sides before any return
        if ql >= 0 && (ql as usize) < self.queues.len() && l_ts.is_none() {
            self.stalled = true;
        }
        if qr >= 0 && (qr as usize) < self.queues.len() && r_ts.is_none() {
            self.stalled = true;
        }

        match (l_ts, r_ts) {
            (None, _) => false, // empty or padding loses
            (Some(_), None) => true,
            (Some(l), Some(r)) => l <= r,
        }
    }

    /// Re-run the tournament along one queue's path to the root.
    fn run_tourn_for_queue(&mut self, q: usize) {
        let ql = (q & !1) as i32;
        let qr = ql + 1;
        let mut idx = (ql as usize + self.qp2 - 1) / 2;

        self.tree[idx] = if self.queue_less(ql, qr) { ql } else { qr };

        while idx > 0 {
            idx = (idx - 1) / 2;
            let left = self.tree[idx * 2 + 1];
            let right = self.tree[idx * 2 + 2];
            self.tree[idx] = if self.queue_less(left, right) {
                left
            } else {
                right
            };
        }
    }
}
