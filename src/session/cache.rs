use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::anyhow;
use log::info;
use tokio::sync::OnceCell;

use crate::error::{LocError, LocResult};
use crate::layout::SightLayout;
use crate::settings::ServiceSettings;

use super::Session;

type Slot = Arc<OnceCell<Arc<Session>>>;

/// At most one [`Session`] per sight, created on first use.
///
/// The map lock is only held long enough to fetch a sight's slot; the
/// construction itself runs inside the slot, so two sights can be warmed
/// in parallel while concurrent callers for the same sight wait on one
/// construction. Construction runs on its own task and finishes even if
/// the caller that started it goes away.
pub struct SessionCache {
    settings: Arc<ServiceSettings>,
    slots: Mutex<HashMap<String, Slot>>,
    constructed: Arc<AtomicUsize>,
}

impl SessionCache {
    pub fn new(settings: Arc<ServiceSettings>) -> Self {
        Self {
            settings,
            slots: Mutex::new(HashMap::new()),
            constructed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn slot(&self, sight_id: &str) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .entry(sight_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub async fn get_or_create(&self, sight_id: &str) -> LocResult<Arc<Session>> {
        let slot = self.slot(sight_id);
        if let Some(session) = slot.get() {
            return Ok(Arc::clone(session));
        }

        let layout = SightLayout::from_settings(&self.settings, sight_id);
        let constructed = Arc::clone(&self.constructed);
        tokio::spawn(async move {
            let session = slot
                .get_or_try_init(|| async move {
                    let sight_id = layout.sight_id.clone();
                    let session = tokio::task::spawn_blocking(move || Session::create(layout))
                        .await
                        .map_err(|err| {
                            LocError::Storage(anyhow!("session construction task failed: {err}"))
                        })??;
                    constructed.fetch_add(1, Ordering::SeqCst);
                    info!("Created session for sight {sight_id}");
                    Ok::<_, LocError>(Arc::new(session))
                })
                .await?;
            Ok::<_, LocError>(Arc::clone(session))
        })
        .await
        .map_err(|err| LocError::Storage(anyhow!("session construction task failed: {err}")))?
    }

    /// The session of `sight_id` if one was already created.
    pub fn get(&self, sight_id: &str) -> Option<Arc<Session>> {
        let slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.get(sight_id).and_then(|slot| slot.get().cloned())
    }

    /// Number of sessions built so far.
    pub fn len(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
