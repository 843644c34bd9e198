use std::sync::Arc;

use crate::collect::Collector;
use crate::scan::ScanTrigger;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub trigger: Arc<ScanTrigger>,
    pub store: Arc<dyn Store>,
}
