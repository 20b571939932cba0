use std::fmt::Debug;
use std::hash::Hash;

use futures::Stream;
use k8s_openapi::serde::de::DeserializeOwned;
use kube::runtime::reflector::Store;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Resource};

/// Creates a reflector store along with the watcher event stream that feeds
/// it. The caller must drive the stream for the store to fill and stay
/// current; unlike a shared-reflector subscriber, the raw event stream also
/// carries deletions.
pub fn create_store_and_events<K>(
    api: Api<K>,
) -> (
    Store<K>,
    impl Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
)
where
    K: Resource + Send + Clone + Debug + DeserializeOwned + Sync + 'static,
    <K as Resource>::DynamicType: Default + Eq + Send + Hash + Clone,
{
    let (store, writer) = reflector::store();
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer);

    (store, stream)
}
