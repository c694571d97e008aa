use futures::future::LocalBoxFuture;

use trainer_core::ports::TaskSpawner;

/// Runs tasks on the browser microtask queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserSpawner;

impl TaskSpawner for BrowserSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}
