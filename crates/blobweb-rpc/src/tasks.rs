//! Background tasks and the RPCs that drive them.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use blobweb_store::{SaveOptions, Store, Task, TaskStatus};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::dispatcher::panic_message;
use crate::error::{RpcError, RpcResult};
use crate::handler::{arg, Reply};
use crate::registry::{RegisterOutcome, Registry, RpcOptions};

/// A function runnable as a background task.
pub type TaskFn = Arc<dyn Fn(Vec<Value>, Map<String, Value>) -> anyhow::Result<Value> + Send + Sync>;

/// Enqueues named tasks and reports on them by id.
pub trait TaskQueue: Send + Sync {
    /// Queue `task_name`, returning the record as first stored.
    fn enqueue(&self, task_name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> RpcResult<Task>;

    /// The current record, or `None` for an unknown id.
    fn poll(&self, task_id: &str) -> RpcResult<Option<Task>>;

    /// Forget a task. Unknown ids are not an error.
    fn delete(&self, task_id: &str) -> RpcResult<()>;
}

/// Runs each task on its own thread and tracks it in a [`Store`].
pub struct ThreadTaskQueue {
    store: Arc<Store>,
    tasks: RwLock<HashMap<String, TaskFn>>,
}

impl ThreadTaskQueue {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Make `func` launchable as `name`. A later registration replaces an
    /// earlier one.
    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(task = %name, "registered task function");
        self.tasks
            .write()
            .expect("lock poisoned")
            .insert(name, Arc::new(func));
    }

    /// Registered task names, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Poll until the task finishes or `timeout` passes. Returns the last
    /// record seen.
    pub fn wait(&self, task_id: &str, timeout: Duration) -> RpcResult<Option<Task>> {
        let deadline = Instant::now() + timeout;
        loop {
            let task = self.poll(task_id)?;
            let finished = task.as_ref().is_some_and(|t| t.status.is_finished());
            if finished || Instant::now() >= deadline {
                return Ok(task);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl TaskQueue for ThreadTaskQueue {
    fn enqueue(&self, task_name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> RpcResult<Task> {
        let func = self
            .tasks
            .read()
            .expect("lock poisoned")
            .get(task_name)
            .cloned()
            .ok_or_else(|| RpcError::UnknownTask(task_name.to_string()))?;

        let task = Task::new(task_name, args, kwargs);
        self.store.save_task(&task, SaveOptions::default())?;

        let store = Arc::clone(&self.store);
        let running = task.clone();
        thread::Builder::new()
            .name(format!("task-{}", task.uid))
            .spawn(move || run_task(&store, running, func))?;

        info!(task = %task_name, id = %task.uid, "task queued");
        Ok(task)
    }

    fn poll(&self, task_id: &str) -> RpcResult<Option<Task>> {
        Ok(self.store.load_task(task_id)?)
    }

    fn delete(&self, task_id: &str) -> RpcResult<()> {
        self.store.delete_task(task_id)?;
        Ok(())
    }
}

impl std::fmt::Debug for ThreadTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTaskQueue")
            .field("store", &self.store.uri())
            .field("tasks", &self.task_names())
            .finish()
    }
}

fn run_task(store: &Store, mut task: Task, func: TaskFn) {
    task.start();
    save_progress(store, &task);

    let args = task.args.clone();
    let kwargs = task.kwargs.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| func(args, kwargs))) {
        Ok(Ok(result)) => task.complete(result),
        Ok(Err(e)) => task.fail(format!("{e:#}")),
        Err(payload) => task.fail(format!("task panicked: {}", panic_message(payload.as_ref()))),
    }

    let elapsed_ms = task.elapsed().map_or(0, |d| d.num_milliseconds());
    if task.status == TaskStatus::Error {
        warn!(task = %task.task_name, id = %task.uid, elapsed_ms, error = task.error.as_deref().unwrap_or(""), "task failed");
    } else {
        info!(task = %task.task_name, id = %task.uid, elapsed_ms, "task completed");
    }
    save_progress(store, &task);
}

/// Record `task` unless it was deleted while running. A delete landing
/// between the check and the write still loses to the write.
fn save_progress(store: &Store, task: &Task) {
    match store.load_task(&task.uid) {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(id = %task.uid, status = %task.status, "task was deleted, dropping its progress");
            return;
        }
        Err(e) => {
            warn!(id = %task.uid, "could not check task record: {e}");
            return;
        }
    }
    if let Err(e) = store.save_task(task, SaveOptions::default()) {
        warn!(id = %task.uid, status = %task.status, "could not record task progress: {e}");
    }
}

/// Register `launch_task`, `check_task`, `get_task_result` and
/// `delete_task` against `queue`.
pub fn register_task_rpcs(registry: &mut Registry, queue: Arc<dyn TaskQueue>) -> Vec<RegisterOutcome> {
    let mut outcomes = Vec::with_capacity(4);

    let q = Arc::clone(&queue);
    outcomes.push(registry.register(
        "launch_task",
        move |_, mut args, kwargs| {
            if args.is_empty() {
                anyhow::bail!("launch_task requires a task name");
            }
            let name: String = serde_json::from_value(args.remove(0))?;
            let task = q.enqueue(&name, args, kwargs)?;
            Reply::json(&task)
        },
        RpcOptions::new(),
    ));

    let q = Arc::clone(&queue);
    outcomes.push(registry.register(
        "check_task",
        move |_, args, _| {
            let task_id: String = arg(&args, 0)?;
            match q.poll(&task_id)? {
                Some(task) => Reply::json(&task),
                None => Ok(Reply::error(format!("No task found for ID \"{task_id}\""))),
            }
        },
        RpcOptions::new(),
    ));

    let q = Arc::clone(&queue);
    outcomes.push(registry.register(
        "get_task_result",
        move |_, args, _| {
            let task_id: String = arg(&args, 0)?;
            let Some(task) = q.poll(&task_id)? else {
                return Ok(Reply::error(format!("No task found for ID \"{task_id}\"")));
            };
            Ok(match task.status {
                TaskStatus::Completed => Reply::Value(task.result.unwrap_or(Value::Null)),
                TaskStatus::Error => Reply::error(format!(
                    "Task \"{task_id}\" failed: {}",
                    task.error.unwrap_or_default()
                )),
                status => Reply::error(format!("Task \"{task_id}\" is not finished ({status})")),
            })
        },
        RpcOptions::new(),
    ));

    outcomes.push(registry.register(
        "delete_task",
        move |_, args, _| {
            let task_id: String = arg(&args, 0)?;
            queue.delete(&task_id)?;
            Ok(Reply::Value(Value::String(task_id)))
        },
        RpcOptions::new(),
    ));

    outcomes
}
