use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_time::Instant;

use tourgen::{LocationLayout, SimulationController, TourScene, WorldSettings};

use crate::ui_model::{
    fmt_fixed, ChartState, ParamSpec, CROSSOVER, LOCATIONS, MUTATION, POPULATION, WORLD_HEIGHT,
    WORLD_WIDTH,
};

mod canvas;
mod chart;
mod engine_js;

use engine_js::JsEngine;

type Controller = SimulationController<JsEngine>;

pub fn start() {
    mount_to_body(|| view! { <App /> });
}

/// Ticks-per-second measured over one-second windows of the run loop.
struct ThroughputMeter {
    window_start: Instant,
    ticks: u32,
}

impl ThroughputMeter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            ticks: 0,
        }
    }

    fn record(&mut self) -> Option<f64> {
        self.ticks += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed.as_millis() < 1000 {
            return None;
        }
        let rate = f64::from(self.ticks) / elapsed.as_secs_f64();
        self.window_start = Instant::now();
        self.ticks = 0;
        Some(rate)
    }
}

#[component]
fn App() -> impl IntoView {
    let controller = StoredValue::new_local(Controller::new(JsEngine::new()));

    let (generation, set_generation) = signal(0u64);
    let (current_length, set_current_length) = signal(String::new());
    let (best_length, set_best_length) = signal(String::new());
    let (gens_per_sec, set_gens_per_sec) = signal("0".to_string());
    let (status, set_status) = signal(String::new());
    let (running, set_running) = signal(false);
    let (chart_hidden, set_chart_hidden) = signal(false);

    let (locations, set_locations) = signal(LOCATIONS.default);
    let (population, set_population) = signal(POPULATION.default);
    let (crossover, set_crossover) = signal(CROSSOVER.default);
    let (mutation, set_mutation) = signal(MUTATION.default);
    let (layout, set_layout) = signal(LocationLayout::Random);

    let chart_state = StoredValue::new(ChartState::new());
    let throughput = StoredValue::new(ThroughputMeter::new());
    let raf_id = StoredValue::new(None::<i32>);

    let world_canvas: NodeRef<leptos::html::Canvas> = NodeRef::new();
    let chart_canvas: NodeRef<leptos::html::Canvas> = NodeRef::new();

    // One subscription drives everything downstream of the controller: the
    // stat signals, the world repaint and the chart sample.
    controller.update_value(|ctl| {
        ctl.on_change(move |state| {
            set_generation.set(state.generation());
            let tour_length = 1.0 / state.current_fitness();
            set_current_length.set(fmt_fixed(tour_length, 2));
            set_best_length.set(fmt_fixed(1.0 / state.best_fitness(), 2));

            match TourScene::from_state(state) {
                Ok(scene) => {
                    if let Some(canvas) = world_canvas.get_untracked() {
                        if let Err(e) = canvas::paint_world(&canvas, &scene) {
                            set_status.set(format!("render failed: {e}"));
                        }
                    }
                }
                Err(e) => set_status.set(format!("render failed: {e}")),
            }

            chart_state.update_value(|chart| {
                if state.generation() == 0 {
                    chart.reset();
                }
                chart.append(state.generation(), tour_length);
                if chart.needs_redraw() {
                    if let Some(canvas) = chart_canvas.get_untracked() {
                        if chart::draw_tour_length_chart(&canvas, chart).is_ok() {
                            chart.mark_drawn();
                        }
                    }
                }
            });
        });
    });

    let build_settings = move || -> Result<WorldSettings, String> {
        WorldSettings::new(
            WORLD_WIDTH,
            WORLD_HEIGHT,
            locations.get_untracked() as u8,
            population.get_untracked() as usize,
            layout.get_untracked(),
            crossover.get_untracked() as f32,
            mutation.get_untracked() as f32,
        )
        .map_err(|e| e.to_string())
    };

    // Settings changes rebuild the world immediately; a failed rebuild
    // leaves the previous world running and reports why.
    let rebuild_world = move || match build_settings() {
        Ok(settings) => {
            let mut result = Ok(());
            controller.update_value(|ctl| result = ctl.initialize(&settings));
            match result {
                Ok(()) => set_status.set(format!("world rebuilt: {} locations", settings.locations)),
                Err(e) => set_status.set(format!("initialize failed: {e}")),
            }
        }
        Err(e) => set_status.set(format!("invalid settings: {e}")),
    };

    let do_tick = move || {
        let mut result = Ok(());
        controller.update_value(|ctl| result = ctl.tick());
        if let Err(e) = result {
            set_running.set(false);
            set_status.set(format!("tick failed: {e}"));
        }
    };

    let do_start = move || {
        if running.get_untracked() {
            return;
        }
        let Some(window) = web_sys::window() else {
            set_status.set("no window".to_string());
            return;
        };
        set_running.set(true);
        throughput.update_value(|m| *m = ThroughputMeter::new());

        // Self-rescheduling frame callback; `running` is the cancellation
        // flag, the stored id covers the frame already requested.
        let holder: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
        let next = Rc::clone(&holder);
        *holder.borrow_mut() = Some(Closure::wrap(Box::new(move || {
            if !running.get_untracked() {
                return;
            }
            do_tick();
            throughput.update_value(|m| {
                if let Some(rate) = m.record() {
                    set_gens_per_sec.set(fmt_fixed(rate, 0));
                }
            });
            let Some(window) = web_sys::window() else {
                return;
            };
            if let Some(cb) = next.borrow().as_ref() {
                match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                    Ok(id) => raf_id.set_value(Some(id)),
                    Err(_) => set_status.set("failed to schedule frame".to_string()),
                }
            }
        }) as Box<dyn FnMut()>));

        let scheduled = holder
            .borrow()
            .as_ref()
            .map(|cb| window.request_animation_frame(cb.as_ref().unchecked_ref()));
        match scheduled {
            Some(Ok(id)) => {
                raf_id.set_value(Some(id));
                set_status.set("running".to_string());
            }
            _ => {
                set_running.set(false);
                set_status.set("failed to start run loop".to_string());
            }
        }
    };

    let do_stop = move || {
        if !running.get_untracked() {
            return;
        }
        set_running.set(false);
        if let Some(id) = raf_id.get_value() {
            raf_id.set_value(None);
            if let Some(window) = web_sys::window() {
                let _ = window.cancel_animation_frame(id);
            }
        }
        set_status.set("paused".to_string());
    };

    on_cleanup(move || do_stop());

    let do_reset = move || {
        do_stop();
        rebuild_world();
    };

    let toggle_chart = move || {
        let hidden = !chart_hidden.get_untracked();
        set_chart_hidden.set(hidden);
        chart_state.update_value(|chart| {
            chart.set_hidden(hidden);
            if chart.needs_redraw() {
                if let Some(canvas) = chart_canvas.get_untracked() {
                    if chart::draw_tour_length_chart(&canvas, chart).is_ok() {
                        chart.mark_drawn();
                    }
                }
            }
        });
    };

    // Build the first world once the canvases exist.
    Effect::new(move |_| rebuild_world());

    let commit = Callback::new(move |_: ()| rebuild_world());

    view! {
        <main style="font-family: system-ui, -apple-system, Segoe UI, Roboto, sans-serif; padding: 18px; max-width: 880px; margin: 0 auto;">
            <h1 style="margin: 0 0 8px 0;">"tourgen"</h1>
            <p style="margin: 0 0 16px 0; color: #555;">
                "Genetic traveling-salesman search, visualized generation by generation."
            </p>

            <section style="display: flex; gap: 10px; flex-wrap: wrap; margin-bottom: 14px;">
                <button prop:disabled=move || running.get() on:click=move |_| do_tick()>
                    "Step"
                </button>
                <button on:click=move |_| {
                    if running.get_untracked() { do_stop() } else { do_start() }
                }>
                    {move || if running.get() { "Pause" } else { "Run" }}
                </button>
                <button on:click=move |_| do_reset()>
                    "Reset"
                </button>
                <button on:click=move |_| toggle_chart()>
                    {move || if chart_hidden.get() { "Show chart" } else { "Hide chart" }}
                </button>
            </section>

            <section style="display: flex; gap: 10px; flex-wrap: wrap; margin-bottom: 14px; align-items: center;">
                <NumberField spec=LOCATIONS value=locations set_value=set_locations on_commit=commit />
                <NumberField spec=POPULATION value=population set_value=set_population on_commit=commit />
                <NumberField spec=CROSSOVER value=crossover set_value=set_crossover on_commit=commit />
                <NumberField spec=MUTATION value=mutation set_value=set_mutation on_commit=commit />

                <label style="display: flex; gap: 8px; align-items: center;">
                    <span style="min-width: 78px; color: #333;">"Layout"</span>
                    <select
                        prop:value=move || layout.get().label().to_string()
                        on:change=move |ev| {
                            match event_target_value(&ev).parse::<LocationLayout>() {
                                Ok(kind) => {
                                    set_layout.set(kind);
                                    rebuild_world();
                                }
                                Err(e) => set_status.set(format!("invalid settings: {e}")),
                            }
                        }
                    >
                        {LocationLayout::all()
                            .iter()
                            .map(|kind| view! { <option value=kind.label()>{kind.label()}</option> })
                            .collect_view()}
                    </select>
                </label>
            </section>

            <canvas node_ref=world_canvas style="border: 1px solid #eee; border-radius: 10px;"></canvas>

            <section style="display: grid; grid-template-columns: 1fr; gap: 8px; margin-top: 14px;">
                <Stat label="Generation" value=move || generation.get().to_string() />
                <Stat label="Tour length" value=move || current_length.get() />
                <Stat label="Best tour length" value=move || best_length.get() />
                <Stat label="Generations/s" value=move || gens_per_sec.get() />
                <Stat label="Status" value=move || status.get() />
            </section>

            <div style:display=move || if chart_hidden.get() { "none" } else { "block" }>
                <canvas node_ref=chart_canvas width="640" height="220" style="margin-top: 14px;"></canvas>
            </div>
        </main>
    }
}

#[component]
fn NumberField(
    spec: ParamSpec,
    value: ReadSignal<f64>,
    set_value: WriteSignal<f64>,
    on_commit: Callback<()>,
) -> impl IntoView {
    view! {
        <label style="display: flex; gap: 8px; align-items: center;">
            <span style="min-width: 78px; color: #333;">{spec.label}</span>
            <input
                type="number"
                min=spec.min.to_string()
                max=spec.max.to_string()
                step=spec.step.to_string()
                prop:value=move || fmt_fixed(value.get(), spec.decimals())
                on:input=move |ev| {
                    let raw = event_target_value(&ev);
                    if let Ok(v) = raw.parse::<f64>() {
                        set_value.set(v.clamp(spec.min, spec.max));
                        on_commit.run(());
                    }
                }
            />
        </label>
    }
}

#[component]
fn Stat(label: &'static str, value: impl Fn() -> String + Send + 'static) -> impl IntoView {
    view! {
        <div style="display: flex; justify-content: space-between; border: 1px solid #eee; padding: 10px 12px; border-radius: 10px;">
            <div style="color: #333; font-weight: 600;">{label}</div>
            <div style="color: #111; font-variant-numeric: tabular-nums;">{value}</div>
        </div>
    }
}
