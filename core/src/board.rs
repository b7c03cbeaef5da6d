use std::cell::RefCell;
use std::rc::Rc;

use crate::gateway::{GatewayError, OrnamentGateway};
use crate::identity::UserId;
use crate::ornament::{Fingerprint, SaveOrnamentRequest, MAX_ORNAMENTS_PER_USER};
use crate::panel::{
    saved_message, Banner, BannerKind, PanelState, DELETED_MESSAGE, DELETE_FAILED_MESSAGE,
    LOAD_FAILED_MESSAGE, REFRESHED_MESSAGE, SAVE_FAILED_MESSAGE,
};
use crate::placement::{
    DeleteTarget, EditingOrnament, Manipulation, PhaseKind, PlacementController, PlacementError,
    SurfacePoint, SurfaceSize,
};
use crate::sync::{FixedOrnament, PollTrigger, Reconciled, RenderStats, SyncFlags, SyncState};

pub type BoardSubscriber = Rc<dyn Fn()>;

/// Platform hooks the board needs but does not own.
#[derive(Clone)]
pub struct BoardServices {
    pub now_ms: Rc<dyn Fn() -> i64>,
    /// Second-stage payload compression applied right before a save is sent.
    pub compress: Rc<dyn Fn(&str) -> String>,
}

impl BoardServices {
    pub fn new(now_ms: Rc<dyn Fn() -> i64>, compress: Rc<dyn Fn(&str) -> String>) -> Self {
        Self { now_ms, compress }
    }
}

struct BoardState {
    user_id: UserId,
    sync: SyncState,
    flags: SyncFlags,
    placement: PlacementController,
    panel: PanelState,
}

impl BoardState {
    fn held_fingerprint(&self) -> Option<Fingerprint> {
        self.placement
            .node()
            .and_then(|node| node.remote_fingerprint())
            .cloned()
    }

    /// Puts a picked-up ornament back on the fixed layer once its editing
    /// node is gone.
    fn release(&mut self, held: Option<Fingerprint>) {
        if held.is_some() && self.placement.node().is_none() {
            self.sync.hold(None);
        }
    }

    fn discard_editing(&mut self) {
        let held = self.held_fingerprint();
        self.placement.cancel();
        self.release(held);
    }
}

#[derive(Clone, Debug)]
pub struct BoardSnapshot {
    pub user_id: UserId,
    pub fixed: Rc<Vec<FixedOrnament>>,
    pub fixed_revision: u64,
    pub editing: Option<EditingOrnament>,
    pub phase: PhaseKind,
    pub own_count: usize,
    pub total: usize,
    pub last_update_ms: Option<i64>,
    pub flags: SyncFlags,
    pub panel: PanelState,
}

impl BoardSnapshot {
    pub fn limit_reached(&self) -> bool {
        self.own_count >= MAX_ORNAMENTS_PER_USER
    }

    pub fn can_add(&self) -> bool {
        !self.limit_reached() && !self.flags.loading
    }

    pub fn can_refresh(&self) -> bool {
        !self.flags.busy()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Skipped,
    Unchanged,
    Changed(RenderStats),
    NoList,
    Failed(GatewayError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { user_count: usize },
    Failed(GatewayError),
    Refused(PlacementError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted { remote: bool },
    RemoteFailed(GatewayError),
    Refused(PlacementError),
}

/// Owned application state for one mounted tree page.
///
/// All mutation goes through `&self` methods; state borrows never span an
/// `.await`, so overlapping requests only ever interleave between awaits.
pub struct Board<G> {
    gateway: G,
    services: BoardServices,
    state: RefCell<BoardState>,
    subscribers: Rc<RefCell<Vec<BoardSubscriber>>>,
}

pub struct BoardSubscription {
    subscriber: BoardSubscriber,
    subscribers: Rc<RefCell<Vec<BoardSubscriber>>>,
}

impl Drop for BoardSubscription {
    fn drop(&mut self) {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|item| !Rc::ptr_eq(item, &self.subscriber));
    }
}

impl<G: OrnamentGateway> Board<G> {
    pub fn new(gateway: G, user_id: UserId, services: BoardServices) -> Self {
        Self {
            gateway,
            services,
            state: RefCell::new(BoardState {
                user_id,
                sync: SyncState::default(),
                flags: SyncFlags::default(),
                placement: PlacementController::new(),
                panel: PanelState::default(),
            }),
            subscribers: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn user_id(&self) -> UserId {
        self.state.borrow().user_id.clone()
    }

    pub fn phase(&self) -> PhaseKind {
        self.state.borrow().placement.kind()
    }

    pub fn panel_open(&self) -> bool {
        self.state.borrow().panel.open
    }

    pub fn subscribe(&self, subscriber: BoardSubscriber) -> BoardSubscription {
        self.subscribers.borrow_mut().push(subscriber.clone());
        BoardSubscription {
            subscriber,
            subscribers: Rc::clone(&self.subscribers),
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.borrow();
        BoardSnapshot {
            user_id: state.user_id.clone(),
            fixed: state.sync.layer().nodes(),
            fixed_revision: state.sync.layer().revision(),
            editing: state.placement.node().cloned(),
            phase: state.placement.kind(),
            own_count: state.sync.own_count(),
            total: state.sync.total(),
            last_update_ms: state.sync.last_update_ms(),
            flags: state.flags,
            panel: state.panel.clone(),
        }
    }

    fn notify(&self) {
        let subscribers = self.subscribers.borrow().clone();
        for subscriber in subscribers {
            (subscriber)();
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut BoardState) -> R) -> R {
        let result = {
            let mut state = self.state.borrow_mut();
            f(&mut state)
        };
        self.notify();
        result
    }

    fn now_ms(&self) -> i64 {
        (self.services.now_ms)()
    }

    /// One poll cycle: fetch, dedupe, diff, reconcile.
    pub async fn refresh(&self, trigger: PollTrigger) -> PollOutcome {
        let started = {
            let mut state = self.state.borrow_mut();
            state.flags.try_begin(trigger)
        };
        if !started {
            return PollOutcome::Skipped;
        }
        self.notify();

        let fetched = self.gateway.list().await;
        let now_ms = self.now_ms();
        self.mutate(|state| {
            let outcome = match fetched {
                Ok(list) => {
                    let held = state.held_fingerprint();
                    let user_id = state.user_id.as_str().to_string();
                    if !trigger.is_silent() {
                        state.panel.error = None;
                    }
                    match state.sync.reconcile(list, &user_id, held.as_ref(), now_ms) {
                        Reconciled::Unchanged => PollOutcome::Unchanged,
                        Reconciled::Changed { stats, .. } => PollOutcome::Changed(stats),
                    }
                }
                Err(GatewayError::MissingList) => PollOutcome::NoList,
                Err(err) => {
                    if !trigger.is_silent() {
                        state.panel.error = Some(LOAD_FAILED_MESSAGE.to_string());
                    }
                    PollOutcome::Failed(err)
                }
            };
            state.flags.finish(trigger);
            outcome
        })
    }

    /// User-requested refresh; confirms with a banner unless the fetch failed.
    pub async fn manual_refresh(&self) -> PollOutcome {
        let outcome = self.refresh(PollTrigger::Manual).await;
        if !matches!(outcome, PollOutcome::Failed(_) | PollOutcome::Skipped) {
            self.show_banner(BannerKind::Success, REFRESHED_MESSAGE);
        }
        outcome
    }

    pub fn begin_placing(&self, src: String) -> Result<(), PlacementError> {
        self.mutate(|state| {
            let live = state.sync.own_count();
            let held = state.held_fingerprint();
            let result = state.placement.begin_placing(src, live);
            state.release(held);
            state.panel.compressing = false;
            if let Err(err) = &result {
                state.panel.show_banner(BannerKind::Error, err.to_string());
            }
            result
        })
    }

    /// Refusal check made before any file is read.
    pub fn ensure_below_limit(&self) -> Result<(), PlacementError> {
        self.mutate(|state| {
            if state.sync.own_count() >= MAX_ORNAMENTS_PER_USER {
                let err = PlacementError::LimitReached {
                    max: MAX_ORNAMENTS_PER_USER,
                };
                state.panel.show_banner(BannerKind::Error, err.to_string());
                return Err(err);
            }
            Ok(())
        })
    }

    pub fn set_compressing(&self, compressing: bool) {
        self.mutate(|state| state.panel.compressing = compressing);
    }

    pub fn place_at(&self, point: SurfacePoint, surface: SurfaceSize) -> Result<bool, PlacementError> {
        self.mutate(|state| state.placement.place_at(point, surface))
    }

    pub fn manipulate(&self, manipulation: Manipulation) -> Result<(), PlacementError> {
        self.mutate(|state| state.placement.manipulate(manipulation))
    }

    pub fn edit_existing(&self, fingerprint: &Fingerprint) -> Result<(), PlacementError> {
        self.mutate(|state| {
            let Some(ornament) = state.sync.find(fingerprint).cloned() else {
                return Err(PlacementError::NotEditing);
            };
            let user_id = state.user_id.as_str().to_string();
            let previous = state.held_fingerprint();
            state.placement.edit_existing(&ornament, &user_id)?;
            if previous.as_ref() != Some(fingerprint) {
                state.sync.hold(Some(fingerprint));
            }
            Ok(())
        })
    }

    pub fn cancel(&self) {
        self.mutate(|state| state.discard_editing());
    }

    pub fn open_panel(&self) {
        self.mutate(|state| {
            state.panel.open = true;
            state.discard_editing();
        });
    }

    pub fn close_panel(&self) {
        self.mutate(|state| {
            state.panel.open = false;
            state.panel.compressing = false;
            state.discard_editing();
        });
    }

    pub fn show_banner(&self, kind: BannerKind, text: impl Into<String>) -> Banner {
        let text = text.into();
        self.mutate(|state| state.panel.show_banner(kind, text))
    }

    pub fn clear_banner(&self, id: u64) {
        let cleared = {
            let mut state = self.state.borrow_mut();
            state.panel.clear_banner(id)
        };
        if cleared {
            self.notify();
        }
    }

    pub fn report_error(&self, text: impl Into<String>) -> Banner {
        self.show_banner(BannerKind::Error, text)
    }

    /// Sends the editing node. On failure the node goes back to editing with
    /// its controls attached.
    pub async fn save(&self) -> SaveOutcome {
        let now_ms = self.now_ms();
        let prepared = self.mutate(|state| -> Result<SaveOrnamentRequest, PlacementError> {
            let user_id = state.user_id.as_str().to_string();
            let request = state.placement.begin_save(&user_id, now_ms)?;
            state.panel.error = None;
            state.flags.loading = true;
            Ok(request)
        });
        let mut request = match prepared {
            Ok(request) => request,
            Err(err) => return SaveOutcome::Refused(err),
        };
        request.src = (self.services.compress)(&request.src);

        match self.gateway.create(&request).await {
            Ok(receipt) => {
                let user_count = self.mutate(|state| {
                    state.placement.save_succeeded();
                    let count = receipt
                        .user_count
                        .map(|count| count as usize)
                        .unwrap_or(state.sync.own_count() + 1)
                        .min(MAX_ORNAMENTS_PER_USER);
                    state.sync.set_own_count(count);
                    count
                });
                self.refresh(PollTrigger::AfterSave).await;
                self.mutate(|state| {
                    state.flags.loading = false;
                    let message = saved_message(user_count, MAX_ORNAMENTS_PER_USER);
                    state.panel.show_banner(BannerKind::Success, message);
                });
                SaveOutcome::Saved { user_count }
            }
            Err(err) => {
                self.mutate(|state| {
                    state.placement.save_failed();
                    let message = err.user_message(SAVE_FAILED_MESSAGE);
                    state.panel.error = Some(message.clone());
                    state.panel.show_banner(BannerKind::Error, message);
                    state.flags.loading = false;
                });
                SaveOutcome::Failed(err)
            }
        }
    }

    /// Removes the editing node; persisted ornaments are deleted remotely first.
    /// The local node goes away even when the remote call fails.
    pub async fn delete(&self) -> DeleteOutcome {
        let started = self.mutate(|state| {
            let held = state.held_fingerprint();
            state.placement.begin_delete().map(|target| (target, held))
        });
        let (target, held) = match started {
            Ok(started) => started,
            Err(err) => return DeleteOutcome::Refused(err),
        };
        let remote = match &target {
            DeleteTarget::Remote(fingerprint) => Some(self.gateway.remove(fingerprint).await),
            DeleteTarget::LocalOnly => None,
        };
        match remote {
            Some(Err(err)) => {
                self.mutate(|state| {
                    state.placement.delete_finished();
                    state.release(held);
                    state.panel.show_banner(BannerKind::Error, DELETE_FAILED_MESSAGE);
                });
                DeleteOutcome::RemoteFailed(err)
            }
            Some(Ok(())) => {
                self.mutate(|state| {
                    state.placement.delete_finished();
                    state.release(held);
                });
                self.refresh(PollTrigger::AfterDelete).await;
                self.show_banner(BannerKind::Success, DELETED_MESSAGE);
                DeleteOutcome::Deleted { remote: true }
            }
            None => {
                self.mutate(|state| {
                    state.placement.delete_finished();
                    state.release(held);
                    state.panel.show_banner(BannerKind::Success, DELETED_MESSAGE);
                });
                DeleteOutcome::Deleted { remote: false }
            }
        }
    }
}
