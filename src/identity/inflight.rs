use std::future::Future;
use std::sync::Arc;
use dashmap::{mapref::entry::Entry, DashMap};
use futures_util::future::{BoxFuture, FutureExt, Shared};

/// 같은 키에 대한 동시 작업을 하나로 합칩니다.
///
/// 먼저 도착한 호출자의 작업만 실행되고, 뒤따르는 호출자는 같은 결과를 기다립니다.
/// 작업이 끝나면 항목은 작업 자신이 제거합니다.
pub struct InFlight<T: Clone> {
    pending: Arc<DashMap<String, Shared<BoxFuture<'static, T>>>>,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    pub async fn run<F>(&self, key: &str, work: F) -> T
    where
        F: Future<Output = T> + Send + 'static,
    {
        let shared = match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let pending = self.pending.clone();
                let owned_key = key.to_string();
                let future = async move {
                    let output = work.await;
                    pending.remove(&owned_key);
                    output
                }
                .boxed()
                .shared();
                entry.insert(future.clone());
                future
            }
        };

        shared.await
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
