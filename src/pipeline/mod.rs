//! Fans page tasks out over a fixed worker pool and folds the results back
//! into page order.

use std::io::{Seek, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::compress::{CompressOptions, CompressionEngine};
use crate::error::{PageError, ProcessError};
use crate::settings::{MAX_THREADS, MIN_THREADS};
use crate::splitter::is_wide;

mod archive;
pub use archive::{page_entry_name, pad_width, write_cbz};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One source page. `index` is its position in the source and the only
/// ordering key used from here on.
#[derive(Debug, Clone)]
pub struct PageTask {
    pub index: usize,
    pub name: String,
    pub data: Vec<u8>,
    pub is_cover: bool,
}

#[derive(Debug)]
pub struct PageResult {
    pub index: usize,
    pub name: String,
    pub original_size: u64,
    pub outcome: Result<Vec<Vec<u8>>, PageError>,
}

impl PageResult {
    pub fn expanded(&self) -> bool {
        matches!(&self.outcome, Ok(pages) if pages.len() > 1)
    }

    pub fn pages(&self) -> &[Vec<u8>] {
        match &self.outcome {
            Ok(pages) => pages,
            Err(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingStatistics {
    pub original_size: u64,
    pub compressed_size: u64,
    pub processed_files: usize,
    pub total_files: usize,
    pub pages_written: usize,
    pub errors: Vec<PageFailure>,
    pub cancelled: bool,
}

impl ProcessingStatistics {
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.original_size as f64
        }
    }

    pub fn saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub current_item: String,
}

pub trait PageWorker: Sync {
    fn process(&self, task: &PageTask) -> Result<Vec<Vec<u8>>, PageError>;
}

/// Routes wide non-cover pages through the splitter and everything else
/// through the single-page path.
#[derive(Clone)]
pub struct CompressionWorker {
    engine: CompressionEngine,
    options: CompressOptions,
}

impl CompressionWorker {
    pub fn new(engine: CompressionEngine, options: CompressOptions) -> Self {
        Self { engine, options }
    }
}

impl PageWorker for CompressionWorker {
    fn process(&self, task: &PageTask) -> Result<Vec<Vec<u8>>, PageError> {
        if !task.is_cover && is_wide(&task.data) {
            let spread = self.engine.split_and_compress(&task.data, &self.options)?;
            Ok(vec![spread.first, spread.second])
        } else {
            let page = self.engine.compress(&task.data, &self.options)?;
            Ok(vec![page.data])
        }
    }
}

#[derive(Debug)]
pub struct PipelineRun {
    pub results: Vec<PageResult>,
    pub statistics: ProcessingStatistics,
}

pub struct ParallelPipeline {
    thread_count: usize,
    cancel: Arc<AtomicBool>,
}

impl ParallelPipeline {
    pub fn new(thread_count: usize, cancel: Arc<AtomicBool>) -> Self {
        Self {
            thread_count: thread_count.clamp(MIN_THREADS, MAX_THREADS),
            cancel,
        }
    }

    pub fn run<W: PageWorker>(
        &self,
        tasks: Vec<PageTask>,
        worker: &W,
        mut progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> PipelineRun {
        let total = tasks.len();
        let mut statistics = ProcessingStatistics {
            total_files: total,
            ..ProcessingStatistics::default()
        };
        let mut results: Vec<PageResult> = Vec::with_capacity(total);
        if total == 0 {
            return PipelineRun {
                results,
                statistics,
            };
        }

        let worker_count = self.thread_count.min(total);
        let task_cursor = AtomicUsize::new(0);
        let cancel = &*self.cancel;
        debug!(tasks = total, workers = worker_count, "starting page workers");

        thread::scope(|scope| {
            let (sender, receiver) = mpsc::channel::<PageResult>();

            for _ in 0..worker_count {
                let sender = sender.clone();
                let tasks = &tasks;
                let cursor = &task_cursor;

                scope.spawn(move || loop {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(index) else {
                        break;
                    };

                    let outcome = worker.process(task);
                    let result = PageResult {
                        index: task.index,
                        name: task.name.clone(),
                        original_size: task.data.len() as u64,
                        outcome,
                    };
                    if sender.send(result).is_err() {
                        break;
                    }
                });
            }
            drop(sender);

            let mut completed = 0usize;
            while completed < total {
                if cancel.load(Ordering::SeqCst) {
                    statistics.cancelled = true;
                    break;
                }

                let result = match receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
                    Ok(result) => result,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                // Finished after the flag was raised: not part of the output.
                if cancel.load(Ordering::SeqCst) {
                    debug!(page = %result.name, "dropping page finished after cancel");
                    statistics.cancelled = true;
                    break;
                }
                completed += 1;

                if let Err(err) = &result.outcome {
                    warn!(page = %result.name, error = %err, "page failed");
                    statistics.errors.push(PageFailure {
                        name: result.name.clone(),
                        message: err.to_string(),
                    });
                }

                emit_progress(
                    &mut progress,
                    BatchProgress {
                        completed,
                        total,
                        current_item: result.name.clone(),
                    },
                );
                results.push(result);
            }

            // In-flight workers see a closed channel and stop after their
            // current task.
            drop(receiver);
        });

        if statistics.cancelled {
            info!(
                completed = results.len(),
                total, "processing cancelled, keeping finished pages"
            );
        }

        results.sort_by_key(|result| result.index);
        PipelineRun {
            results,
            statistics,
        }
    }

    pub fn run_to_archive<W: PageWorker, O: Write + Seek>(
        &self,
        tasks: Vec<PageTask>,
        worker: &W,
        output: O,
        progress: Option<&mut dyn FnMut(BatchProgress)>,
    ) -> Result<(O, ProcessingStatistics), ProcessError> {
        let PipelineRun {
            results,
            mut statistics,
        } = self.run(tasks, worker, progress);
        let output = write_cbz(output, &results, &mut statistics)?;
        Ok((output, statistics))
    }
}

fn emit_progress(callback: &mut Option<&mut dyn FnMut(BatchProgress)>, payload: BatchProgress) {
    if let Some(listener) = callback.as_mut() {
        listener(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::{Cursor, Read};
    use std::sync::Mutex;

    struct JitterWorker {
        fail_on: Option<usize>,
        split_on: Option<usize>,
    }

    impl PageWorker for JitterWorker {
        fn process(&self, task: &PageTask) -> Result<Vec<Vec<u8>>, PageError> {
            let mut rng = StdRng::seed_from_u64(task.index as u64);
            thread::sleep(Duration::from_millis(rng.gen_range(0..15)));
            if Some(task.index) == self.fail_on {
                return Err(PageError::Empty);
            }
            if Some(task.index) == self.split_on {
                return Ok(vec![
                    format!("{}a", task.index).into_bytes(),
                    format!("{}b", task.index).into_bytes(),
                ]);
            }
            Ok(vec![task.index.to_string().into_bytes()])
        }
    }

    struct SlowWorker {
        seen: Mutex<Vec<usize>>,
    }

    impl PageWorker for SlowWorker {
        fn process(&self, task: &PageTask) -> Result<Vec<Vec<u8>>, PageError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(task.index);
            }
            thread::sleep(Duration::from_millis(20));
            Ok(vec![vec![task.index as u8]])
        }
    }

    // Page 1 waits for page 0 to be reported, raises the flag, then keeps
    // working for a while.
    struct CancelMidTaskWorker {
        cancel: Arc<AtomicBool>,
        first_reported: Arc<AtomicBool>,
    }

    impl PageWorker for CancelMidTaskWorker {
        fn process(&self, task: &PageTask) -> Result<Vec<Vec<u8>>, PageError> {
            if task.index == 1 {
                for _ in 0..400 {
                    if self.first_reported.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                self.cancel.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
            }
            Ok(vec![vec![task.index as u8]])
        }
    }

    fn tasks(count: usize) -> Vec<PageTask> {
        (0..count)
            .map(|index| PageTask {
                index,
                name: format!("page{}.png", index),
                data: vec![0u8; 10 + index],
                is_cover: index == 0,
            })
            .collect()
    }

    fn entries(archive: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).expect("open archive");
        (0..zip.len())
            .map(|i| {
                let mut file = zip.by_index(i).expect("entry");
                assert_eq!(file.compression(), zip::CompressionMethod::Stored);
                let mut data = Vec::new();
                file.read_to_end(&mut data).expect("read entry");
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn order_survives_jitter() {
        let pipeline = ParallelPipeline::new(4, Arc::new(AtomicBool::new(false)));
        let worker = JitterWorker {
            fail_on: None,
            split_on: None,
        };
        let mut events = Vec::new();
        let mut recorder = |progress: BatchProgress| events.push(progress);

        let run = pipeline.run(tasks(12), &worker, Some(&mut recorder));

        let indices: Vec<usize> = run.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
        assert!(!run.statistics.cancelled);
        assert_eq!(events.len(), 12);
        for (position, event) in events.iter().enumerate() {
            assert_eq!(event.completed, position + 1);
            assert_eq!(event.total, 12);
        }
    }

    #[test]
    fn archive_is_renumbered_and_padded() {
        let pipeline = ParallelPipeline::new(3, Arc::new(AtomicBool::new(false)));
        let worker = JitterWorker {
            fail_on: None,
            split_on: Some(4),
        };

        let (output, stats) = pipeline
            .run_to_archive(tasks(10), &worker, Cursor::new(Vec::new()), None)
            .expect("write archive");
        let written = entries(output.into_inner());

        // 10 tasks, one split: 11 pages, two digits.
        assert_eq!(written.len(), 11);
        assert_eq!(stats.pages_written, 11);
        assert_eq!(stats.processed_files, 10);
        assert_eq!(written[0], ("01.jpg".to_string(), b"0".to_vec()));
        assert_eq!(written[4], ("05.jpg".to_string(), b"4a".to_vec()));
        assert_eq!(written[5], ("06.jpg".to_string(), b"4b".to_vec()));
        assert_eq!(written[10], ("11.jpg".to_string(), b"9".to_vec()));
        let original: u64 = (0..10).map(|i| 10 + i as u64).sum();
        assert_eq!(stats.original_size, original);
    }

    #[test]
    fn failed_page_is_recorded_and_others_kept() {
        let pipeline = ParallelPipeline::new(2, Arc::new(AtomicBool::new(false)));
        let worker = JitterWorker {
            fail_on: Some(3),
            split_on: None,
        };

        let (output, stats) = pipeline
            .run_to_archive(tasks(6), &worker, Cursor::new(Vec::new()), None)
            .expect("write archive");
        let written = entries(output.into_inner());

        assert_eq!(written.len(), 5);
        let payloads: Vec<Vec<u8>> = written.into_iter().map(|(_, data)| data).collect();
        assert_eq!(
            payloads,
            vec![b"0".to_vec(), b"1".to_vec(), b"2".to_vec(), b"4".to_vec(), b"5".to_vec()]
        );
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].name, "page3.png");
        assert_eq!(stats.processed_files, 5);
        assert_eq!(stats.total_files, 6);
    }

    #[test]
    fn cancellation_stops_new_work() {
        let cancel = Arc::new(AtomicBool::new(false));
        let pipeline = ParallelPipeline::new(1, Arc::clone(&cancel));
        let worker = SlowWorker {
            seen: Mutex::new(Vec::new()),
        };
        let flag = Arc::clone(&cancel);
        let mut cancel_after_three = |progress: BatchProgress| {
            if progress.completed == 3 {
                flag.store(true, Ordering::SeqCst);
            }
        };

        let (output, stats) = pipeline
            .run_to_archive(
                tasks(20),
                &worker,
                Cursor::new(Vec::new()),
                Some(&mut cancel_after_three),
            )
            .expect("write archive");
        let written = entries(output.into_inner());

        assert!(stats.cancelled);
        assert_eq!(written.len(), 3);
        for (position, (_, data)) in written.iter().enumerate() {
            assert_eq!(data, &vec![position as u8]);
        }
        // Only the task already in flight may run after the flag is raised.
        let seen = worker.seen.lock().expect("seen lock").len();
        assert!(seen <= 5, "{} tasks started after cancellation", seen);
    }

    #[test]
    fn page_finishing_after_cancel_is_not_written() {
        let cancel = Arc::new(AtomicBool::new(false));
        let first_reported = Arc::new(AtomicBool::new(false));
        let pipeline = ParallelPipeline::new(1, Arc::clone(&cancel));
        let worker = CancelMidTaskWorker {
            cancel: Arc::clone(&cancel),
            first_reported: Arc::clone(&first_reported),
        };
        let mut mark_first = |_progress: BatchProgress| {
            first_reported.store(true, Ordering::SeqCst);
        };

        let (output, stats) = pipeline
            .run_to_archive(
                tasks(5),
                &worker,
                Cursor::new(Vec::new()),
                Some(&mut mark_first),
            )
            .expect("write archive");
        let written = entries(output.into_inner());

        assert!(stats.cancelled);
        assert_eq!(written, vec![("1.jpg".to_string(), vec![0u8])]);
        assert_eq!(stats.pages_written, 1);
    }

    #[test]
    fn empty_batch_writes_empty_archive() {
        let pipeline = ParallelPipeline::new(8, Arc::new(AtomicBool::new(false)));
        let worker = JitterWorker {
            fail_on: None,
            split_on: None,
        };
        let (output, stats) = pipeline
            .run_to_archive(Vec::new(), &worker, Cursor::new(Vec::new()), None)
            .expect("write archive");
        assert!(entries(output.into_inner()).is_empty());
        assert_eq!(stats.ratio(), 1.0);
    }

    #[test]
    fn statistics_ratio() {
        let stats = ProcessingStatistics {
            original_size: 400,
            compressed_size: 100,
            ..ProcessingStatistics::default()
        };
        assert!((stats.ratio() - 0.25).abs() < 1e-9);
        assert_eq!(stats.saved(), 300);
    }
}
