use std::rc::Rc;

use communitree_core::ornament::{CLEANUP_MINUTES, DEFAULT_ORNAMENT_SIZE_PX};
use communitree_core::panel::{
    limit_label, Banner, BannerKind, COMPRESSING_INSTRUCTION, CONFIRM_DELETE_MESSAGE,
    DEFAULT_INSTRUCTION, HIGHLIGHT_MS, NOT_AN_IMAGE_MESSAGE, PLACEMENT_INSTRUCTION,
    PROCESS_FAILED_MESSAGE,
};
use communitree_core::placement::{EditingOrnament, PhaseKind, PlacementError};
use communitree_core::sync::FixedOrnament;
use communitree_core::{
    Board, BoardServices, BoardSnapshot, DeleteOutcome, Fingerprint, PollOutcome, PollTrigger,
    SaveOutcome, SurfacePoint, SurfaceSize, MAX_ORNAMENTS_PER_USER, POLL_INTERVAL_MS,
};
use gloo::events::{EventListener, EventListenerOptions, EventListenerPhase};
use gloo::timers::callback::{Interval, Timeout};
use js_sys::Date;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, Event, HtmlInputElement, KeyboardEvent, Node, PointerEvent};
use yew::prelude::*;

use crate::gateway::{default_api_base, BrowserGateway};
use crate::identity::client_user_id;
use crate::manipulation::{Corner, Gesture, Handle};
use crate::upload::{compress_for_save, prepare_upload, UploadError};

type TreeBoard = Board<BrowserGateway>;

fn log_poll(trigger: PollTrigger, outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Failed(err) => {
            gloo::console::warn!("poll failed", format!("{trigger:?}"), err.to_string());
        }
        PollOutcome::NoList => {
            gloo::console::warn!("poll: response carried no ornament list");
        }
        _ => {}
    }
}

fn log_placement<T>(action: &str, result: Result<T, PlacementError>) {
    if let Err(err) = result {
        gloo::console::warn!(action, err.to_string());
    }
}

fn spawn_refresh(board: Rc<TreeBoard>, trigger: PollTrigger) {
    spawn_local(async move {
        let outcome = board.refresh(trigger).await;
        log_poll(trigger, &outcome);
    });
}

fn spawn_delete(board: Rc<TreeBoard>) {
    spawn_local(async move {
        if let DeleteOutcome::RemoteFailed(err) = board.delete().await {
            gloo::console::error!("delete failed", err.to_string());
        }
    });
}

fn format_clock(ms: i64) -> String {
    let date = Date::new(&wasm_bindgen::JsValue::from_f64(ms as f64));
    format!("{:02}:{:02}", date.get_hours(), date.get_minutes())
}

fn element_center(element: &Element) -> (f64, f64) {
    let rect = element.get_bounding_client_rect();
    (
        rect.left() + rect.width() / 2.0,
        rect.top() + rect.height() / 2.0,
    )
}

fn event_inside(event: &Event, refs: &[&NodeRef]) -> bool {
    let Some(target) = event.target().and_then(|target| target.dyn_into::<Node>().ok()) else {
        return false;
    };
    refs.iter()
        .filter_map(|node_ref| node_ref.get())
        .any(|node| node.contains(Some(&target)))
}

fn is_text_entry(event: &Event) -> bool {
    event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok())
        .map(|element| matches!(element.tag_name().as_str(), "INPUT" | "TEXTAREA"))
        .unwrap_or(false)
}

fn confirm(message: &str) -> bool {
    web_sys::window()
        .and_then(|window| window.confirm_with_message(message).ok())
        .unwrap_or(false)
}

#[function_component(App)]
pub(crate) fn app() -> Html {
    let board = use_memo((), |_| {
        let services = BoardServices::new(
            Rc::new(|| Date::now() as i64),
            Rc::new(compress_for_save),
        );
        Board::new(
            BrowserGateway::new(default_api_base()),
            client_user_id(),
            services,
        )
    });
    let update = use_force_update();
    let highlighted = use_state(|| None::<Fingerprint>);
    let gesture = use_mut_ref(|| None::<Gesture>);
    let tree_ref = use_node_ref();
    let panel_ref = use_node_ref();
    let open_button_ref = use_node_ref();
    let file_ref = use_node_ref();
    let editing_ref = use_node_ref();

    {
        let board = board.clone();
        use_effect_with((), move |_| {
            let subscription = board.subscribe(Rc::new(move || update.force_update()));
            move || drop(subscription)
        });
    }

    {
        let board = board.clone();
        use_effect_with((), move |_| {
            spawn_refresh(board.clone(), PollTrigger::Mount);
            let interval = Interval::new(POLL_INTERVAL_MS, move || {
                spawn_refresh(board.clone(), PollTrigger::Timer);
            });
            move || drop(interval)
        });
    }

    let snapshot = board.snapshot();

    {
        let board = board.clone();
        let banner = snapshot.panel.banner.clone();
        use_effect_with(banner.as_ref().map(|banner| banner.id), move |_| {
            let timeout = banner.map(|banner| {
                Timeout::new(banner.kind.duration_ms(), move || board.clear_banner(banner.id))
            });
            move || drop(timeout)
        });
    }

    {
        let highlighted = highlighted.clone();
        use_effect_with((*highlighted).clone(), move |current| {
            let timeout = current
                .is_some()
                .then(|| Timeout::new(HIGHLIGHT_MS, move || highlighted.set(None)));
            move || drop(timeout)
        });
    }

    {
        let board = board.clone();
        let gesture = gesture.clone();
        let tree_ref = tree_ref.clone();
        let panel_ref = panel_ref.clone();
        let open_button_ref = open_button_ref.clone();
        let editing_ref = editing_ref.clone();
        use_effect_with((), move |_| {
            let Some(window) = web_sys::window() else {
                return Box::new(|| ()) as Box<dyn FnOnce()>;
            };
            let capture = EventListenerOptions {
                phase: EventListenerPhase::Capture,
                passive: false,
            };

            let move_board = board.clone();
            let move_gesture = gesture.clone();
            let move_listener =
                EventListener::new_with_options(&window, "pointermove", capture, move |event| {
                    let Some(event) = event.dyn_ref::<PointerEvent>() else {
                        return;
                    };
                    let step = move_gesture.borrow_mut().as_mut().and_then(|gesture| {
                        gesture.update((f64::from(event.client_x()), f64::from(event.client_y())))
                    });
                    if let Some(manipulation) = step {
                        event.prevent_default();
                        log_placement("manipulate", move_board.manipulate(manipulation));
                    }
                });

            let up_gesture = gesture.clone();
            let up_listener = EventListener::new(&window, "pointerup", move |_event| {
                up_gesture.borrow_mut().take();
            });
            let cancel_gesture = gesture;
            let cancel_listener = EventListener::new(&window, "pointercancel", move |_event| {
                cancel_gesture.borrow_mut().take();
            });

            let key_board = board.clone();
            let key_listener = EventListener::new(&window, "keydown", move |event| {
                let Some(key_event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                if !matches!(key_event.key().as_str(), "Delete" | "Backspace")
                    || is_text_entry(event)
                    || key_board.phase() != PhaseKind::Editing
                {
                    return;
                }
                event.prevent_default();
                if confirm(CONFIRM_DELETE_MESSAGE) {
                    spawn_delete(key_board.clone());
                }
            });

            let click_board = board;
            let click_listener = EventListener::new(&window, "click", move |event| {
                if !click_board.panel_open() {
                    return;
                }
                if event_inside(event, &[&panel_ref, &open_button_ref, &tree_ref, &editing_ref]) {
                    return;
                }
                click_board.close_panel();
            });

            Box::new(move || {
                drop(move_listener);
                drop(up_listener);
                drop(cancel_listener);
                drop(key_listener);
                drop(click_listener);
            }) as Box<dyn FnOnce()>
        });
    }

    let on_open_panel = {
        let board = board.clone();
        Callback::from(move |_event: MouseEvent| board.open_panel())
    };
    let on_close_panel = {
        let board = board.clone();
        Callback::from(move |_event: MouseEvent| board.close_panel())
    };
    let on_add_click = {
        let board = board.clone();
        let file_ref = file_ref.clone();
        Callback::from(move |_event: MouseEvent| {
            if board.ensure_below_limit().is_err() {
                return;
            }
            if let Some(input) = file_ref.cast::<HtmlInputElement>() {
                input.click();
            }
        })
    };
    let on_file_change = {
        let board = board.clone();
        Callback::from(move |event: Event| {
            let input: HtmlInputElement = event.target_unchecked_into();
            let Some(file) = input.files().and_then(|files| files.get(0)) else {
                return;
            };
            input.set_value("");
            let board = board.clone();
            board.set_compressing(true);
            spawn_local(async move {
                match prepare_upload(file).await {
                    Ok(src) => {
                        log_placement("begin placing", board.begin_placing(src));
                    }
                    Err(UploadError::NotAnImage) => {
                        board.set_compressing(false);
                        board.report_error(NOT_AN_IMAGE_MESSAGE);
                    }
                    Err(UploadError::Read(err)) => {
                        gloo::console::error!("upload failed", err);
                        board.set_compressing(false);
                        board.report_error(PROCESS_FAILED_MESSAGE);
                    }
                }
            });
        })
    };
    let on_tree_click = {
        let board = board.clone();
        let tree_ref = tree_ref.clone();
        Callback::from(move |event: MouseEvent| {
            if board.phase() != PhaseKind::Placing {
                return;
            }
            let Some(tree) = tree_ref.cast::<Element>() else {
                return;
            };
            let rect = tree.get_bounding_client_rect();
            let point = SurfacePoint {
                x: f64::from(event.client_x()) - rect.left(),
                y: f64::from(event.client_y()) - rect.top(),
            };
            let surface = SurfaceSize {
                width: rect.width(),
                height: rect.height(),
            };
            log_placement("place", board.place_at(point, surface));
        })
    };
    let on_refresh = {
        let board = board.clone();
        Callback::from(move |_event: MouseEvent| {
            let board = board.clone();
            spawn_local(async move {
                let outcome = board.manual_refresh().await;
                log_poll(PollTrigger::Manual, &outcome);
            });
        })
    };
    let on_save = {
        let board = board.clone();
        Callback::from(move |event: MouseEvent| {
            event.stop_propagation();
            let board = board.clone();
            spawn_local(async move {
                if let SaveOutcome::Failed(err) = board.save().await {
                    gloo::console::error!("save failed", err.to_string());
                }
            });
        })
    };
    let on_delete = {
        let board = board.clone();
        Callback::from(move |event: MouseEvent| {
            event.stop_propagation();
            spawn_delete(board.clone());
        })
    };
    let on_select = {
        let highlighted = highlighted.clone();
        Callback::from(move |fingerprint: Fingerprint| highlighted.set(Some(fingerprint)))
    };
    let on_pick_up = {
        let board = board.clone();
        Callback::from(move |fingerprint: Fingerprint| {
            log_placement("pick up", board.edit_existing(&fingerprint));
        })
    };
    let begin_gesture = {
        let board = board.clone();
        let gesture = gesture.clone();
        let editing_ref = editing_ref.clone();
        move |handle: Handle| {
            let board = board.clone();
            let gesture = gesture.clone();
            let editing_ref = editing_ref.clone();
            Callback::from(move |event: PointerEvent| {
                event.stop_propagation();
                event.prevent_default();
                let Some(node) = board.snapshot().editing else {
                    return;
                };
                if !node.controls_attached {
                    return;
                }
                let center = editing_ref
                    .cast::<Element>()
                    .map(|element| element_center(&element))
                    .unwrap_or((node.left + node.width / 2.0, node.top + node.height / 2.0));
                let pointer = (f64::from(event.client_x()), f64::from(event.client_y()));
                *gesture.borrow_mut() = Some(Gesture::begin(handle, pointer, &node, center));
            })
        }
    };

    let editing_view = snapshot.editing.as_ref().map(|node| {
        editing_node_view(
            node,
            snapshot.phase,
            &editing_ref,
            &begin_gesture,
            on_save.clone(),
            on_delete.clone(),
        )
    });

    html! {
        <>
            <div
                class={classes!("floating-panel", snapshot.panel.open.then_some("active"))}
                ref={panel_ref}
            >
                <div class="panel-header">
                    <span>{ "Add to Community Tree" }</span>
                    <button class="close-panel-btn" onclick={on_close_panel}>{ "×" }</button>
                </div>
                <div class="panel-content">
                    { instruction_view(&snapshot) }
                    if snapshot.flags.loading {
                        <div class="loading">
                            <div class="loading-spinner"></div>
                            <p>{ "Loading..." }</p>
                        </div>
                    }
                    if let Some(error) = snapshot.panel.error.as_ref() {
                        <div class="panel-error">{ error.clone() }</div>
                    }
                    <button
                        class="btn-add-ornament"
                        onclick={on_add_click.clone()}
                        disabled={!snapshot.can_add()}
                    >
                        <span>{ "+" }</span>
                        <span>{ limit_label(snapshot.own_count, MAX_ORNAMENTS_PER_USER) }</span>
                    </button>
                    <input
                        type="file"
                        accept="image/*"
                        class="hidden-file-input"
                        ref={file_ref}
                        onchange={on_file_change}
                    />
                    <div class="panel-footer">
                        <p>{ "Your ornament will be visible to everyone in the community" }</p>
                        <p class="muted">{ format!("User ID: {}...", snapshot.user_id.short()) }</p>
                        <p class="muted">
                            { format!("Auto-update: Every {} seconds", POLL_INTERVAL_MS / 1000) }
                        </p>
                    </div>
                </div>
            </div>

            if !snapshot.panel.open {
                <button class="open-panel-btn" ref={open_button_ref} onclick={on_open_panel}>
                    <span>{ "Add to Tree" }</span>
                </button>
            }

            <main class="tree-page">
                <h1 class="header2 center">{ "Community tree" }</h1>
                <p class="lead">
                    { "Add your ornament to our shared Christmas tree! Click the \"Add to Tree\" button on the right." }
                </p>
                { status_view(&snapshot, on_refresh, on_add_click) }
                <div class="community-workspace">
                    <div
                        class={classes!(
                            "community-tree",
                            (snapshot.phase == PhaseKind::Placing).then_some("placing")
                        )}
                        ref={tree_ref}
                        onclick={on_tree_click}
                    >
                        <FixedLayerView
                            nodes={snapshot.fixed.clone()}
                            revision={snapshot.fixed_revision}
                            highlighted={(*highlighted).clone()}
                            on_select={on_select}
                            on_pick_up={on_pick_up}
                        />
                        { editing_view.unwrap_or_default() }
                    </div>
                </div>
            </main>
        </>
    }
}

fn instruction_view(snapshot: &BoardSnapshot) -> Html {
    if let Some(Banner { kind, text, .. }) = snapshot.panel.banner.as_ref() {
        let class = match kind {
            BannerKind::Success => "panel-instruction banner-success",
            BannerKind::Error => "panel-instruction banner-error",
        };
        return html! { <div class={class}><p>{ text.clone() }</p></div> };
    }
    if snapshot.panel.compressing {
        return html! { <div class="panel-instruction"><p>{ COMPRESSING_INSTRUCTION }</p></div> };
    }
    if snapshot.phase == PhaseKind::Placing {
        return html! { <div class="placement-message"><p>{ PLACEMENT_INSTRUCTION }</p></div> };
    }
    html! {
        <div class="panel-instruction">
            <p>{ DEFAULT_INSTRUCTION }</p>
            <p class="hint">
                { format!(
                    "Images larger than 768KB will be compressed automatically. You have {}/{} ornaments.",
                    snapshot.own_count, MAX_ORNAMENTS_PER_USER
                ) }
            </p>
            <p class="muted">
                { format!("Ornaments are automatically removed every {CLEANUP_MINUTES} minutes") }
            </p>
        </div>
    }
}

fn status_view(
    snapshot: &BoardSnapshot,
    on_refresh: Callback<MouseEvent>,
    on_add_click: Callback<MouseEvent>,
) -> Html {
    let last_update = snapshot
        .last_update_ms
        .map(format_clock)
        .unwrap_or_else(|| "Never".to_string());
    let add_label = if snapshot.limit_reached() {
        "Limit Reached"
    } else {
        "Add New Ornament"
    };
    html! {
        <div class="tree-status">
            <button
                class="refresh-btn"
                title="Refresh ornaments"
                onclick={on_refresh}
                disabled={!snapshot.can_refresh()}
            >
                <i class={classes!("fas", "fa-sync", snapshot.flags.updating.then_some("fa-spin"))}></i>
                { "Refresh" }
            </button>
            <p>{ "You can place " }<strong>{ MAX_ORNAMENTS_PER_USER.to_string() }</strong>{ " ornaments" }</p>
            <p>{ "Auto-cleanup: " }<strong>{ format!("Every {CLEANUP_MINUTES} minutes") }</strong></p>
            <p class="muted">{ "Total ornaments on tree: " }<strong>{ snapshot.total.to_string() }</strong></p>
            <p class="muted">{ format!("Last update: {last_update}") }</p>
            <button
                class="btn-add-inline"
                onclick={on_add_click}
                disabled={snapshot.limit_reached()}
            >
                { add_label }
            </button>
        </div>
    }
}

fn editing_node_view(
    node: &EditingOrnament,
    phase: PhaseKind,
    editing_ref: &NodeRef,
    begin_gesture: &impl Fn(Handle) -> Callback<PointerEvent>,
    on_save: Callback<MouseEvent>,
    on_delete: Callback<MouseEvent>,
) -> Html {
    let style = format!(
        "left:{}px;top:{}px;width:{}px;height:{}px;transform:{};",
        node.left,
        node.top,
        node.width,
        node.height,
        node.css_transform()
    );
    let in_flight = matches!(phase, PhaseKind::Saving | PhaseKind::Deleting);
    let swallow = Callback::from(|event: PointerEvent| event.stop_propagation());
    let handles: Html = Corner::ALL
        .iter()
        .map(|corner| {
            html! { <div class={corner.class()} onpointerdown={begin_gesture(Handle::Resize(*corner))}></div> }
        })
        .collect();
    html! {
        <div
            class={classes!("ornament", "editing", node.fixed.then_some("fixed"))}
            style={style}
            ref={editing_ref.clone()}
            onpointerdown={begin_gesture(Handle::Body)}
        >
            <div class="ornament-image-container">
                <img src={node.src.clone()} draggable="false" />
            </div>
            if node.controls_attached {
                <div class="ornament-controls-overlay">
                    { handles }
                    <div class="handle handle-rotate" onpointerdown={begin_gesture(Handle::Rotate)}></div>
                    <div class="ornament-buttons" onpointerdown={swallow}>
                        if node.can_save() {
                            <button class="btn-control btn-save" onclick={on_save} disabled={in_flight}>
                                { "Save to Community Tree" }
                            </button>
                        }
                        <button class="btn-control btn-delete" onclick={on_delete} disabled={in_flight}>
                            { "Delete Ornament" }
                        </button>
                    </div>
                </div>
            }
        </div>
    }
}

#[derive(Properties)]
struct FixedLayerProps {
    nodes: Rc<Vec<FixedOrnament>>,
    revision: u64,
    highlighted: Option<Fingerprint>,
    on_select: Callback<Fingerprint>,
    on_pick_up: Callback<Fingerprint>,
}

// The layer only changes when a poll rebuilt it, so unchanged polls skip
// re-rendering entirely.
impl PartialEq for FixedLayerProps {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision && self.highlighted == other.highlighted
    }
}

#[function_component(FixedLayerView)]
fn fixed_layer_view(props: &FixedLayerProps) -> Html {
    props
        .nodes
        .iter()
        .map(|node| {
            let highlighted = props.highlighted.as_ref() == Some(&node.fingerprint);
            fixed_ornament_view(node, highlighted, &props.on_select, &props.on_pick_up)
        })
        .collect()
}

fn css_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn fixed_ornament_view(
    node: &FixedOrnament,
    highlighted: bool,
    on_select: &Callback<Fingerprint>,
    on_pick_up: &Callback<Fingerprint>,
) -> Html {
    let ornament = &node.ornament;
    let default_size = format!("{DEFAULT_ORNAMENT_SIZE_PX}px");
    let style = format!(
        "left:{};top:{};width:{};height:{};transform:{};",
        css_or(&ornament.x, "0px"),
        css_or(&ornament.y, "0px"),
        css_or(&ornament.width, &default_size),
        css_or(&ornament.height, &default_size),
        ornament.transform
    );
    let onclick = {
        let on_select = on_select.clone();
        let fingerprint = node.fingerprint.clone();
        Callback::from(move |_event: MouseEvent| on_select.emit(fingerprint.clone()))
    };
    let ondblclick = {
        let on_pick_up = on_pick_up.clone();
        let fingerprint = node.fingerprint.clone();
        Callback::from(move |_event: MouseEvent| on_pick_up.emit(fingerprint.clone()))
    };
    html! {
        <div
            key={node.fingerprint.to_string()}
            class={classes!("ornament", "fixed", highlighted.then_some("highlighted"))}
            data-ornament-id={node.fingerprint.to_string()}
            style={style}
            {onclick}
            {ondblclick}
        >
            <div class="ornament-image-container">
                <img src={ornament.renderable_src().map(str::to_string)} draggable="false" />
            </div>
        </div>
    }
}
