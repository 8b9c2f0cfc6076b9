//! Bindings to the external optimization engine module.
//!
//! The engine ships as a wasm module behind the bare specifier
//! `salesman-engine`, resolved by the bundler exactly like any other npm
//! import. Its JS wrapper exposes the handle classes the contract in
//! [`tourgen::engine`] describes, plus a `memory` accessor for the engine
//! instance's `WebAssembly.Memory` — which is what makes zero-copy views
//! over the genome and location bytes possible.
//!
//! Every handle wrapper here calls the engine's `free()` from `Drop`, so an
//! engine-side release happens exactly once per handle, on every exit path.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{ArrayBuffer, Object, Uint8Array, WebAssembly};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use tourgen::{
    Engine, EngineError, EngineWorld, GenomeHandle, LocationLayout, SharedMemory, WorldSettings,
};

#[wasm_bindgen(module = "salesman-engine")]
extern "C" {
    #[wasm_bindgen(js_name = WorldSettings)]
    type JsWorldSettings;

    #[wasm_bindgen(static_method_of = JsWorldSettings, js_class = "WorldSettings", js_name = new, catch)]
    fn create(
        width: u8,
        height: u8,
        locations: u8,
        population_size: u32,
        layout: u8,
        crossover_rate: f32,
        mutation_rate: f32,
    ) -> Result<JsWorldSettings, JsValue>;

    #[wasm_bindgen(method, js_class = "WorldSettings")]
    fn free(this: &JsWorldSettings);

    #[wasm_bindgen(js_name = World)]
    type JsWorld;

    #[wasm_bindgen(static_method_of = JsWorld, js_class = "World", js_name = new, catch)]
    fn create(settings: &JsWorldSettings) -> Result<JsWorld, JsValue>;

    #[wasm_bindgen(method, js_class = "World")]
    fn tick(this: &JsWorld);

    #[wasm_bindgen(method, js_class = "World", catch)]
    fn fittest(this: &JsWorld) -> Result<JsGenome, JsValue>;

    #[wasm_bindgen(method, js_class = "World")]
    fn locations(this: &JsWorld) -> u32;

    #[wasm_bindgen(method, js_class = "World")]
    fn location_count(this: &JsWorld) -> u32;

    #[wasm_bindgen(js_name = Genome)]
    type JsGenome;

    #[wasm_bindgen(method, getter, js_class = "Genome")]
    fn fitness(this: &JsGenome) -> f64;

    #[wasm_bindgen(method, getter, js_class = "Genome")]
    fn data(this: &JsGenome) -> u32;

    #[wasm_bindgen(method, js_class = "Genome")]
    fn free(this: &JsGenome);

    /// The engine instance's linear memory.
    #[wasm_bindgen(js_name = memory)]
    fn engine_memory() -> WebAssembly::Memory;
}

/// Shared reference to the engine's linear memory.
///
/// `WebAssembly.Memory` growth replaces the backing `ArrayBuffer`; every
/// access compares the buffer by object identity and bumps the epoch when
/// it changed, which is what invalidates outstanding views.
#[derive(Clone)]
pub(super) struct JsMemory(Rc<JsMemoryInner>);

struct JsMemoryInner {
    memory: WebAssembly::Memory,
    buffer: RefCell<JsValue>,
    epoch: Cell<u64>,
}

impl JsMemory {
    fn new(memory: WebAssembly::Memory) -> Self {
        let buffer = memory.buffer();
        Self(Rc::new(JsMemoryInner {
            memory,
            buffer: RefCell::new(buffer),
            epoch: Cell::new(0),
        }))
    }

    fn buffer(&self) -> JsValue {
        let current = self.0.memory.buffer();
        if !Object::is(&current, &self.0.buffer.borrow()) {
            *self.0.buffer.borrow_mut() = current.clone();
            self.0.epoch.set(self.0.epoch.get() + 1);
        }
        current
    }
}

impl SharedMemory for JsMemory {
    fn epoch(&self) -> u64 {
        let _ = self.buffer();
        self.0.epoch.get()
    }

    fn size(&self) -> usize {
        self.buffer().unchecked_into::<ArrayBuffer>().byte_length() as usize
    }

    fn read(&self, offset: usize, dst: &mut [u8]) {
        let buffer = self.buffer();
        Uint8Array::new_with_byte_offset_and_length(&buffer, offset as u32, dst.len() as u32)
            .copy_to(dst);
    }
}

pub(super) struct SettingsHandle(JsWorldSettings);

impl Drop for SettingsHandle {
    fn drop(&mut self) {
        self.0.free();
    }
}

pub(super) struct WorldHandle(JsWorld);

pub(super) struct FittestHandle {
    genome: JsGenome,
    fitness: f64,
    data: usize,
}

impl GenomeHandle for FittestHandle {
    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn data_offset(&self) -> usize {
        self.data
    }
}

impl Drop for FittestHandle {
    fn drop(&mut self) {
        self.genome.free();
    }
}

impl EngineWorld for WorldHandle {
    type Genome = FittestHandle;

    fn tick(&mut self) {
        self.0.tick();
    }

    fn fittest(&mut self) -> Result<FittestHandle, EngineError> {
        let genome = self
            .0
            .fittest()
            .map_err(|e| EngineError::Call(describe(e)))?;
        // Cache the scalars so later reads skip the JS boundary.
        let fitness = genome.fitness();
        let data = genome.data() as usize;
        Ok(FittestHandle {
            genome,
            fitness,
            data,
        })
    }

    fn locations_offset(&self) -> usize {
        self.0.locations() as usize
    }

    fn location_count(&self) -> usize {
        self.0.location_count() as usize
    }
}

pub(super) struct JsEngine {
    memory: JsMemory,
}

impl JsEngine {
    pub(super) fn new() -> Self {
        Self {
            memory: JsMemory::new(engine_memory()),
        }
    }
}

impl Engine for JsEngine {
    type Memory = JsMemory;
    type Settings = SettingsHandle;
    type World = WorldHandle;

    fn memory(&self) -> JsMemory {
        self.memory.clone()
    }

    fn settings(&self, settings: &WorldSettings) -> Result<SettingsHandle, EngineError> {
        JsWorldSettings::create(
            settings.width,
            settings.height,
            settings.locations,
            settings.population_size as u32,
            layout_code(settings.layout),
            settings.crossover_rate,
            settings.mutation_rate,
        )
        .map(SettingsHandle)
        .map_err(|e| EngineError::Construction(describe(e)))
    }

    fn world(&self, settings: &SettingsHandle) -> Result<WorldHandle, EngineError> {
        JsWorld::create(&settings.0)
            .map(WorldHandle)
            .map_err(|e| EngineError::Construction(describe(e)))
    }
}

/// Numeric discriminants of the engine's layout enum.
fn layout_code(layout: LocationLayout) -> u8 {
    match layout {
        LocationLayout::Random => 0,
        LocationLayout::Circle => 1,
    }
}

fn describe(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}
