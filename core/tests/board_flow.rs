use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::block_on;

use communitree_core::panel::BannerKind;
use communitree_core::placement::PhaseKind;
use communitree_core::{
    Board, BoardServices, CreateReceipt, DeleteOutcome, Fingerprint, GatewayError, Ornament,
    OrnamentGateway, PlacementError, PollOutcome, PollTrigger, SaveOrnamentRequest, SaveOutcome,
    SurfacePoint, SurfaceSize, UserId,
};

const USER: &str = "user_1700000000000_abcdefghi";
const SURFACE: SurfaceSize = SurfaceSize {
    width: 600.0,
    height: 800.0,
};

#[derive(Default)]
struct FakeUpstream {
    ornaments: RefCell<Vec<Ornament>>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
    fail_remove: Cell<bool>,
    /// Remove answers success but keeps the list as it was.
    ignore_remove: Cell<bool>,
    /// Overrides the `userCount` the create call reports.
    reported_count: Cell<Option<Option<u32>>>,
    list_calls: Cell<usize>,
    create_calls: Cell<usize>,
}

/// In-memory stand-in for the shared store, capped at five per user.
struct FakeGateway(Rc<FakeUpstream>);

impl OrnamentGateway for FakeGateway {
    async fn list(&self) -> Result<Vec<Ornament>, GatewayError> {
        self.0.list_calls.set(self.0.list_calls.get() + 1);
        let gate = self.0.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(self.0.ornaments.borrow().clone())
    }

    async fn create(&self, request: &SaveOrnamentRequest) -> Result<CreateReceipt, GatewayError> {
        self.0.create_calls.set(self.0.create_calls.get() + 1);
        let mut ornaments = self.0.ornaments.borrow_mut();
        let owned = ornaments
            .iter()
            .filter(|ornament| ornament.belongs_to(&request.user_id))
            .count();
        if owned >= 5 {
            return Err(GatewayError::Rejected(
                "Maximum 5 ornaments per user".to_string(),
            ));
        }
        ornaments.push(request.to_ornament());
        let user_count = self
            .0
            .reported_count
            .get()
            .unwrap_or(Some(owned as u32 + 1));
        Ok(CreateReceipt { user_count })
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), GatewayError> {
        if self.0.fail_remove.get() {
            return Err(GatewayError::Status(500));
        }
        if self.0.ignore_remove.get() {
            return Ok(());
        }
        self.0
            .ornaments
            .borrow_mut()
            .retain(|ornament| &ornament.fingerprint() != fingerprint);
        Ok(())
    }
}

fn ornament(user: &str, x: u32) -> Ornament {
    Ornament {
        user_id: user.to_string(),
        src: format!("data:image/jpeg;base64,{x:04}"),
        x: format!("{x}px"),
        y: "40px".to_string(),
        width: "120px".to_string(),
        height: "120px".to_string(),
        transform: String::new(),
        timestamp: i64::from(x),
    }
}

fn board_with(ornaments: Vec<Ornament>) -> (Board<FakeGateway>, Rc<FakeUpstream>) {
    let upstream = Rc::new(FakeUpstream::default());
    *upstream.ornaments.borrow_mut() = ornaments;
    let clock = Rc::new(Cell::new(1_000_i64));
    let services = BoardServices::new(
        Rc::new(move || {
            clock.set(clock.get() + 1);
            clock.get()
        }),
        Rc::new(|src: &str| src.to_string()),
    );
    let board = Board::new(
        FakeGateway(Rc::clone(&upstream)),
        UserId::from_raw(USER),
        services,
    );
    (board, upstream)
}

fn place_one(board: &Board<FakeGateway>, x: f64) {
    board
        .begin_placing("data:image/jpeg;base64,new".to_string())
        .expect("placing");
    assert!(board
        .place_at(SurfacePoint { x, y: 200.0 }, SURFACE)
        .expect("place"));
}

#[test]
fn mount_poll_renders_fixed_layer_and_counts_own() {
    let (board, _) = board_with(vec![ornament(USER, 1), ornament("user_other", 2)]);
    let outcome = block_on(board.refresh(PollTrigger::Mount));
    assert!(matches!(outcome, PollOutcome::Changed(stats) if stats.inserted == 2));
    let snapshot = board.snapshot();
    assert_eq!(snapshot.own_count, 1);
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.fixed.len(), 2);
    assert!(!snapshot.flags.loading);
}

#[test]
fn identical_polls_do_not_touch_the_layer() {
    let (board, upstream) = board_with(vec![ornament(USER, 1), ornament(USER, 1)]);
    block_on(board.refresh(PollTrigger::Mount));
    let revision = board.snapshot().fixed_revision;
    assert_eq!(board.snapshot().fixed.len(), 1);

    let notified = Rc::new(Cell::new(0));
    let counter = Rc::clone(&notified);
    let _subscription = board.subscribe(Rc::new(move || counter.set(counter.get() + 1)));
    for _ in 0..3 {
        assert_eq!(block_on(board.refresh(PollTrigger::Timer)), PollOutcome::Unchanged);
    }
    assert_eq!(board.snapshot().fixed_revision, revision);
    assert_eq!(upstream.list_calls.get(), 4);
    assert!(notified.get() > 0);
}

#[test]
fn timer_cycle_is_skipped_while_manual_refresh_runs() {
    let (board, upstream) = board_with(vec![ornament(USER, 1)]);
    let (release, gate) = oneshot::channel();
    *upstream.gate.borrow_mut() = Some(gate);

    let (manual, timer, ()) = block_on(async {
        futures::join!(
            board.manual_refresh(),
            board.refresh(PollTrigger::Timer),
            async {
                let _ = release.send(());
            }
        )
    });
    assert!(matches!(manual, PollOutcome::Changed(_)));
    assert_eq!(timer, PollOutcome::Skipped);
    assert_eq!(upstream.list_calls.get(), 1);
    let banner = board.snapshot().panel.banner.expect("banner");
    assert_eq!(banner.kind, BannerKind::Success);
}

#[test]
fn save_increments_own_count_and_clears_editing_node() {
    let (board, upstream) = board_with(vec![ornament(USER, 1)]);
    block_on(board.refresh(PollTrigger::Mount));
    place_one(&board, 300.0);

    let outcome = block_on(board.save());
    assert_eq!(outcome, SaveOutcome::Saved { user_count: 2 });
    let snapshot = board.snapshot();
    assert_eq!(snapshot.own_count, 2);
    assert!(snapshot.editing.is_none());
    assert_eq!(snapshot.phase, PhaseKind::Idle);
    assert_eq!(snapshot.fixed.len(), 2);
    assert_eq!(upstream.ornaments.borrow()[1].x, "240px");
    let banner = snapshot.panel.banner.expect("banner");
    assert_eq!(banner.text, "✓ Ornament saved! You have 2/5 ornaments");
}

#[test]
fn cap_is_refused_before_any_network_call() {
    let own: Vec<_> = (1..=5).map(|x| ornament(USER, x)).collect();
    let (board, upstream) = board_with(own);
    block_on(board.refresh(PollTrigger::Mount));

    assert_eq!(
        board.ensure_below_limit(),
        Err(PlacementError::LimitReached { max: 5 })
    );
    assert!(board.begin_placing("data:image/png;base64,x".into()).is_err());
    assert_eq!(upstream.create_calls.get(), 0);
    let snapshot = board.snapshot();
    assert!(snapshot.limit_reached());
    assert!(!snapshot.can_add());
    assert_eq!(snapshot.panel.banner.expect("banner").kind, BannerKind::Error);
}

#[test]
fn server_rejection_keeps_one_editing_node_with_controls() {
    let (board, upstream) = board_with(Vec::new());
    block_on(board.refresh(PollTrigger::Mount));
    place_one(&board, 300.0);
    // Another tab filled the quota after our last poll.
    for x in 10..15 {
        upstream.ornaments.borrow_mut().push(ornament(USER, x));
    }

    let outcome = block_on(board.save());
    assert!(matches!(outcome, SaveOutcome::Failed(GatewayError::Rejected(_))));
    let snapshot = board.snapshot();
    assert_eq!(snapshot.phase, PhaseKind::Editing);
    let node = snapshot.editing.expect("editing node kept");
    assert!(node.controls_attached);
    assert!(!node.fixed);
    assert_eq!(
        snapshot.panel.error.as_deref(),
        Some("Maximum 5 ornaments per user")
    );
    assert!(!snapshot.flags.loading);
}

#[test]
fn failed_remote_delete_still_removes_local_node() {
    let mine = ornament(USER, 7);
    let fingerprint = mine.fingerprint();
    let (board, upstream) = board_with(vec![mine]);
    block_on(board.refresh(PollTrigger::Mount));
    board.edit_existing(&fingerprint).expect("pick up");
    assert!(!board.snapshot().fixed.iter().any(|n| n.fingerprint == fingerprint));

    upstream.fail_remove.set(true);
    let outcome = block_on(board.delete());
    assert_eq!(outcome, DeleteOutcome::RemoteFailed(GatewayError::Status(500)));
    let snapshot = board.snapshot();
    assert!(snapshot.editing.is_none());
    assert_eq!(upstream.ornaments.borrow().len(), 1);
    assert_eq!(upstream.list_calls.get(), 1);
    assert!(snapshot.fixed.iter().any(|n| n.fingerprint == fingerprint));

    // The server still has it, so later polls keep showing it.
    for _ in 0..3 {
        assert_eq!(block_on(board.refresh(PollTrigger::Timer)), PollOutcome::Unchanged);
    }
    let snapshot = board.snapshot();
    assert_eq!(snapshot.total, 1);
    assert_eq!(snapshot.fixed.len(), 1);
    assert!(snapshot.fixed.iter().any(|n| n.fingerprint == fingerprint));
}

#[test]
fn ignored_remote_delete_keeps_ornament_rendered() {
    let mine = ornament(USER, 7);
    let fingerprint = mine.fingerprint();
    let (board, upstream) = board_with(vec![mine]);
    block_on(board.refresh(PollTrigger::Mount));
    board.edit_existing(&fingerprint).expect("pick up");

    upstream.ignore_remove.set(true);
    let outcome = block_on(board.delete());
    assert_eq!(outcome, DeleteOutcome::Deleted { remote: true });
    let snapshot = board.snapshot();
    assert!(snapshot.editing.is_none());
    assert!(snapshot.fixed.iter().any(|n| n.fingerprint == fingerprint));
    assert_eq!(block_on(board.refresh(PollTrigger::Timer)), PollOutcome::Unchanged);
    assert_eq!(board.snapshot().fixed.len(), 1);
}

#[test]
fn save_count_is_clamped_to_the_cap() {
    let own: Vec<_> = (1..=4).map(|x| ornament(USER, x)).collect();
    let (board, upstream) = board_with(own);
    upstream.reported_count.set(Some(Some(7)));
    block_on(board.refresh(PollTrigger::Mount));
    place_one(&board, 300.0);

    assert_eq!(block_on(board.save()), SaveOutcome::Saved { user_count: 5 });
    let snapshot = board.snapshot();
    assert_eq!(snapshot.own_count, 5);
    assert_eq!(
        snapshot.panel.banner.expect("banner").text,
        "✓ Ornament saved! You have 5/5 ornaments"
    );
}

#[test]
fn save_without_user_count_adds_one_to_local_count() {
    let own: Vec<_> = (1..=4).map(|x| ornament(USER, x)).collect();
    let (board, upstream) = board_with(own);
    upstream.reported_count.set(Some(None));
    block_on(board.refresh(PollTrigger::Mount));
    place_one(&board, 300.0);

    assert_eq!(block_on(board.save()), SaveOutcome::Saved { user_count: 5 });
    let snapshot = board.snapshot();
    assert_eq!(snapshot.own_count, 5);
    assert!(snapshot.limit_reached());
}

#[test]
fn delete_of_picked_up_ornament_refreshes_list() {
    let mine = ornament(USER, 7);
    let fingerprint = mine.fingerprint();
    let (board, upstream) = board_with(vec![mine, ornament("user_other", 9)]);
    block_on(board.refresh(PollTrigger::Mount));
    board.edit_existing(&fingerprint).expect("pick up");

    let outcome = block_on(board.delete());
    assert_eq!(outcome, DeleteOutcome::Deleted { remote: true });
    let snapshot = board.snapshot();
    assert_eq!(snapshot.own_count, 0);
    assert_eq!(snapshot.fixed.len(), 1);
    assert_eq!(upstream.list_calls.get(), 2);
}

#[test]
fn others_ornaments_cannot_be_picked_up() {
    let theirs = ornament("user_other", 3);
    let fingerprint = theirs.fingerprint();
    let (board, _) = board_with(vec![theirs]);
    block_on(board.refresh(PollTrigger::Mount));
    assert_eq!(board.edit_existing(&fingerprint), Err(PlacementError::NotOwner));
    assert!(board.snapshot().editing.is_none());
}

#[test]
fn stale_banner_timer_leaves_newer_banner() {
    let (board, _) = board_with(Vec::new());
    let first = board.show_banner(BannerKind::Success, "one");
    board.report_error("two");
    board.clear_banner(first.id);
    assert_eq!(
        board.snapshot().panel.banner.map(|banner| banner.text),
        Some("two".to_string())
    );
}
