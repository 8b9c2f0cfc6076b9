//! The simulation-control loop.
//!
//! A [`SimulationController`] owns one engine world at a time, drives it
//! generation-by-generation, and maintains the only state the application
//! cares about: the current generation's fittest tour (a live view into
//! engine memory, replaced every generation) and the best tour observed
//! across the whole run (an owned byte copy that survives engine scratch
//! reuse). Subscribers are notified synchronously after `initialize` and
//! after every `tick`.

use thiserror::Error;

use crate::engine::{Engine, EngineError, EngineWorld, GenomeHandle, MemoryView, ViewError};
use crate::settings::{SettingsError, WorldSettings};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("tick called before initialize")]
    Uninitialized,
}

/// The current generation's fittest tour: the engine handle (kept alive so
/// the underlying bytes stay valid, released on replacement) plus a view
/// over its index sequence.
struct Fittest<E: Engine> {
    #[allow(dead_code)]
    handle: <E::World as EngineWorld>::Genome,
    view: MemoryView<E::Memory>,
    fitness: f64,
}

/// Everything staged by the fittest-replacement procedure before any of it
/// is committed to controller state.
struct Adoption<E: Engine> {
    fittest: Fittest<E>,
    /// Present when fitness strictly improved on the recorded best:
    /// the new best fitness and an owned copy of the tour bytes.
    improved: Option<(f64, Vec<u8>)>,
}

/// Fittest-replacement, staged: derive a fresh view over the genome's bytes
/// and, when its fitness strictly beats `best_fitness`, copy those bytes
/// out of engine memory. Ties keep the earlier best.
fn stage_fittest<E: Engine>(
    memory: &E::Memory,
    genome: <E::World as EngineWorld>::Genome,
    location_count: usize,
    best_fitness: f64,
) -> Result<Adoption<E>, WorldError> {
    let view = MemoryView::new(memory.clone(), genome.data_offset(), location_count)?;
    let fitness = genome.fitness();
    let improved = if fitness > best_fitness {
        Some((fitness, view.to_vec()?))
    } else {
        None
    };
    Ok(Adoption {
        fittest: Fittest {
            handle: genome,
            view,
            fitness,
        },
        improved,
    })
}

/// Read-only state of an initialized controller, handed to subscribers on
/// every change notification.
pub struct WorldState<E: Engine> {
    world: E::World,
    width: u8,
    height: u8,
    generation: u64,
    location_count: usize,
    locations: MemoryView<E::Memory>,
    current: Fittest<E>,
    best_fitness: f64,
    best_genome: Vec<u8>,
}

impl<E: Engine> WorldState<E> {
    /// Generations advanced since the world was (re)initialized.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn location_count(&self) -> usize {
        self.location_count
    }

    /// View over the fixed location table: `location_count` x,y byte pairs.
    pub fn locations(&self) -> &MemoryView<E::Memory> {
        &self.locations
    }

    /// View over the current generation's fittest tour. Valid until the
    /// next `tick` or `initialize`.
    pub fn current_genome(&self) -> &MemoryView<E::Memory> {
        &self.current.view
    }

    pub fn current_fitness(&self) -> f64 {
        self.current.fitness
    }

    /// Owned snapshot of the best tour observed this run. Empty until the
    /// first strict fitness improvement (in practice: populated at
    /// generation 0, since any real fitness beats the reset value of 0).
    pub fn best_genome(&self) -> &[u8] {
        &self.best_genome
    }

    /// Best fitness observed this run; non-decreasing between initializes.
    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }
}

type ChangeFn<E> = Box<dyn FnMut(&WorldState<E>)>;

/// Owns the engine world handle and drives the simulation. Lives for the
/// application's lifetime; dropping it releases the current world and all
/// live genome handles.
pub struct SimulationController<E: Engine> {
    engine: E,
    memory: E::Memory,
    state: Option<WorldState<E>>,
    subscribers: Vec<ChangeFn<E>>,
}

impl<E: Engine> SimulationController<E> {
    pub fn new(engine: E) -> Self {
        let memory = engine.memory();
        Self {
            engine,
            memory,
            state: None,
            subscribers: Vec::new(),
        }
    }

    /// Register a change subscriber. Subscribers run synchronously, in
    /// registration order, after `initialize` and after every `tick`.
    pub fn on_change(&mut self, subscriber: impl FnMut(&WorldState<E>) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn state(&self) -> Option<&WorldState<E>> {
        self.state.as_ref()
    }

    /// Build a new world from `settings` and swap it in, resetting the
    /// generation counter and the best-ever record.
    ///
    /// The replacement is fully staged first: settings validation, engine
    /// construction, view derivation and the generation-0 fittest adoption
    /// all happen before the previous world is touched, so any failure
    /// leaves the controller exactly as it was.
    pub fn initialize(&mut self, settings: &WorldSettings) -> Result<(), WorldError> {
        settings.validate()?;
        let mut world = {
            // The engine-side settings handle is only needed for
            // construction; dropping it here releases it on every path.
            let handle = self.engine.settings(settings)?;
            self.engine.world(&handle)?
        };

        let location_count = world.location_count();
        let locations = MemoryView::new(
            self.memory.clone(),
            world.locations_offset(),
            location_count * 2,
        )?;
        let genome = world.fittest()?;
        let adoption = stage_fittest::<E>(&self.memory, genome, location_count, 0.0)?;
        let (best_fitness, best_genome) = adoption.improved.unwrap_or((0.0, Vec::new()));

        // Commit point: the previous world (and its live fittest handle)
        // is dropped only now that the replacement exists in full.
        self.state = Some(WorldState {
            world,
            width: settings.width,
            height: settings.height,
            generation: 0,
            location_count,
            locations,
            current: adoption.fittest,
            best_fitness,
            best_genome,
        });
        self.notify();
        Ok(())
    }

    /// Advance the world by exactly one generation and run the
    /// fittest-replacement procedure.
    pub fn tick(&mut self) -> Result<(), WorldError> {
        let state = self.state.as_mut().ok_or(WorldError::Uninitialized)?;
        state.world.tick();

        // Views are re-derived every generation; engine scratch from the
        // previous generation is never read through a cached view.
        let locations = MemoryView::new(
            self.memory.clone(),
            state.world.locations_offset(),
            state.location_count * 2,
        )?;
        let genome = state.world.fittest()?;
        let adoption = stage_fittest::<E>(&self.memory, genome, state.location_count, state.best_fitness)?;

        state.generation += 1;
        state.locations = locations;
        state.current = adoption.fittest;
        if let Some((fitness, bytes)) = adoption.improved {
            state.best_fitness = fitness;
            state.best_genome = bytes;
        }
        self.notify();
        Ok(())
    }

    fn notify(&mut self) {
        if let Some(state) = self.state.as_ref() {
            for subscriber in self.subscribers.iter_mut() {
                subscriber(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SharedMemory;
    use crate::scene::TourScene;
    use crate::settings::LocationLayout;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const LOCATIONS_OFFSET: usize = 0;
    const SCRATCH_OFFSET: usize = 512;
    const MEMORY_SIZE: usize = 1024;

    #[derive(Clone)]
    struct TestMemory(Rc<TestMemoryInner>);

    struct TestMemoryInner {
        bytes: RefCell<Vec<u8>>,
        epoch: Cell<u64>,
    }

    impl TestMemory {
        fn new() -> Self {
            Self(Rc::new(TestMemoryInner {
                bytes: RefCell::new(vec![0; MEMORY_SIZE]),
                epoch: Cell::new(0),
            }))
        }

        fn write(&self, offset: usize, bytes: &[u8]) {
            self.0.bytes.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
    }

    impl SharedMemory for TestMemory {
        fn epoch(&self) -> u64 {
            self.0.epoch.get()
        }

        fn size(&self) -> usize {
            self.0.bytes.borrow().len()
        }

        fn read(&self, offset: usize, dst: &mut [u8]) {
            dst.copy_from_slice(&self.0.bytes.borrow()[offset..offset + dst.len()]);
        }
    }

    /// Drop/usage counters shared between the scripted engine's handles and
    /// the assertions.
    #[derive(Default)]
    struct Ledger {
        settings_built: Cell<u32>,
        settings_released: Cell<u32>,
        worlds_built: Cell<u32>,
        genomes_released: Cell<u32>,
    }

    struct TestSettings {
        settings: WorldSettings,
        ledger: Rc<Ledger>,
    }

    impl Drop for TestSettings {
        fn drop(&mut self) {
            self.ledger
                .settings_released
                .set(self.ledger.settings_released.get() + 1);
        }
    }

    struct TestGenome {
        fitness: f64,
        offset: usize,
        ledger: Rc<Ledger>,
    }

    impl GenomeHandle for TestGenome {
        fn fitness(&self) -> f64 {
            self.fitness
        }

        fn data_offset(&self) -> usize {
            self.offset
        }
    }

    impl Drop for TestGenome {
        fn drop(&mut self) {
            self.ledger
                .genomes_released
                .set(self.ledger.genomes_released.get() + 1);
        }
    }

    struct TestWorld {
        memory: TestMemory,
        locations: usize,
        generation: usize,
        fitness_script: Vec<f64>,
        ledger: Rc<Ledger>,
    }

    impl TestWorld {
        /// Scripted fitness for a generation; deterministic filler once the
        /// script runs out.
        fn fitness_at(&self, generation: usize) -> f64 {
            self.fitness_script.get(generation).copied().unwrap_or_else(|| {
                1.0 + ((generation * 7919) % 1000) as f64 / 1000.0
            })
        }
    }

    impl EngineWorld for TestWorld {
        type Genome = TestGenome;

        fn tick(&mut self) {
            self.generation += 1;
        }

        fn fittest(&mut self) -> Result<TestGenome, EngineError> {
            // Overwrite the scratch region with this generation's tour: the
            // identity permutation rotated by the generation number. Later
            // generations clobber earlier ones, like real engine scratch.
            let tour: Vec<u8> = (0..self.locations)
                .map(|i| ((i + self.generation) % self.locations) as u8)
                .collect();
            self.memory.write(SCRATCH_OFFSET, &tour);
            Ok(TestGenome {
                fitness: self.fitness_at(self.generation),
                offset: SCRATCH_OFFSET,
                ledger: Rc::clone(&self.ledger),
            })
        }

        fn locations_offset(&self) -> usize {
            LOCATIONS_OFFSET
        }

        fn location_count(&self) -> usize {
            self.locations
        }
    }

    struct TestEngine {
        memory: TestMemory,
        fitness_script: Vec<f64>,
        fail_world: Cell<bool>,
        ledger: Rc<Ledger>,
    }

    impl TestEngine {
        fn new(fitness_script: Vec<f64>) -> Self {
            Self {
                memory: TestMemory::new(),
                fitness_script,
                fail_world: Cell::new(false),
                ledger: Rc::new(Ledger::default()),
            }
        }
    }

    impl Engine for Rc<TestEngine> {
        type Memory = TestMemory;
        type Settings = TestSettings;
        type World = TestWorld;

        fn memory(&self) -> TestMemory {
            self.memory.clone()
        }

        fn settings(&self, settings: &WorldSettings) -> Result<TestSettings, EngineError> {
            self.ledger.settings_built.set(self.ledger.settings_built.get() + 1);
            Ok(TestSettings {
                settings: *settings,
                ledger: Rc::clone(&self.ledger),
            })
        }

        fn world(&self, handle: &TestSettings) -> Result<TestWorld, EngineError> {
            if self.fail_world.get() {
                return Err(EngineError::Construction("allocation failed".to_string()));
            }
            self.ledger.worlds_built.set(self.ledger.worlds_built.get() + 1);
            let locations = usize::from(handle.settings.locations);
            // Deterministic location table: x = 3i, y = 5i.
            let table: Vec<u8> = (0..locations)
                .flat_map(|i| [(i * 3) as u8, (i * 5) as u8])
                .collect();
            self.memory.write(LOCATIONS_OFFSET, &table);
            Ok(TestWorld {
                memory: self.memory.clone(),
                locations,
                generation: 0,
                fitness_script: self.fitness_script.clone(),
                ledger: Rc::clone(&self.ledger),
            })
        }
    }

    fn settings(locations: u8) -> WorldSettings {
        WorldSettings {
            width: 255,
            height: 255,
            locations,
            population_size: 50,
            layout: LocationLayout::Random,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
        }
    }

    fn controller(script: Vec<f64>) -> (SimulationController<Rc<TestEngine>>, Rc<TestEngine>) {
        let engine = Rc::new(TestEngine::new(script));
        (SimulationController::new(Rc::clone(&engine)), engine)
    }

    fn rotation(locations: usize, by: usize) -> Vec<u8> {
        (0..locations).map(|i| ((i + by) % locations) as u8).collect()
    }

    #[test]
    fn generation_counter_tracks_ticks() {
        let (mut ctl, _) = controller(Vec::new());
        ctl.initialize(&settings(10)).unwrap();
        assert_eq!(ctl.state().unwrap().generation(), 0);

        for expected in 1..=5u64 {
            ctl.tick().unwrap();
            assert_eq!(ctl.state().unwrap().generation(), expected);
        }
    }

    #[test]
    fn tick_before_initialize_is_an_error() {
        let (mut ctl, _) = controller(Vec::new());
        assert_eq!(ctl.tick().unwrap_err(), WorldError::Uninitialized);
        assert!(ctl.state().is_none());
    }

    #[test]
    fn best_fitness_is_monotonic_and_resets_on_initialize() {
        let (mut ctl, _) = controller(vec![5.0, 3.0, 8.0, 8.0, 2.0]);
        ctl.initialize(&settings(6)).unwrap();
        assert_eq!(ctl.state().unwrap().best_fitness(), 5.0);

        let expected = [5.0, 8.0, 8.0, 8.0];
        for best in expected {
            ctl.tick().unwrap();
            let state = ctl.state().unwrap();
            assert_eq!(state.best_fitness(), best);
            assert!(state.best_fitness() >= state.current_fitness());
        }

        // Reinitialization starts the record over from 0.
        ctl.initialize(&settings(6)).unwrap();
        assert_eq!(ctl.state().unwrap().best_fitness(), 5.0);
        assert_eq!(ctl.state().unwrap().generation(), 0);
    }

    #[test]
    fn best_genome_is_an_independent_copy() {
        let (mut ctl, _) = controller(vec![5.0, 3.0, 9.0, 1.0]);
        ctl.initialize(&settings(8)).unwrap();
        ctl.tick().unwrap();
        ctl.tick().unwrap();
        // Generation 2 set a new record; its tour is rotation-by-2.
        assert_eq!(ctl.state().unwrap().best_genome(), rotation(8, 2));

        // The next generation overwrites the engine scratch region, but the
        // snapshot keeps the generation-2 bytes.
        ctl.tick().unwrap();
        let state = ctl.state().unwrap();
        assert_eq!(state.current_genome().to_vec().unwrap(), rotation(8, 3));
        assert_eq!(state.best_genome(), rotation(8, 2));
        assert_eq!(state.best_fitness(), 9.0);
    }

    #[test]
    fn equal_fitness_keeps_the_earlier_best() {
        let (mut ctl, _) = controller(vec![5.0, 7.0, 7.0]);
        ctl.initialize(&settings(5)).unwrap();
        ctl.tick().unwrap();
        assert_eq!(ctl.state().unwrap().best_genome(), rotation(5, 1));

        ctl.tick().unwrap();
        // Generation 2 ties; the generation-1 tour stays on record.
        assert_eq!(ctl.state().unwrap().best_genome(), rotation(5, 1));
    }

    #[test]
    fn genomes_are_permutations_of_the_location_set() {
        let (mut ctl, _) = controller(Vec::new());
        ctl.initialize(&settings(10)).unwrap();
        for _ in 0..3 {
            ctl.tick().unwrap();
            let state = ctl.state().unwrap();
            let mut tour = state.current_genome().to_vec().unwrap();
            assert_eq!(tour.len(), state.location_count());
            tour.sort_unstable();
            let expected: Vec<u8> = (0..10).collect();
            assert_eq!(tour, expected);
        }
    }

    #[test]
    fn reinitialize_resizes_the_location_view() {
        let (mut ctl, _) = controller(Vec::new());
        ctl.initialize(&settings(8)).unwrap();
        assert_eq!(ctl.state().unwrap().locations().len(), 16);
        ctl.tick().unwrap();

        ctl.initialize(&settings(12)).unwrap();
        let state = ctl.state().unwrap();
        assert_eq!(state.location_count(), 12);
        assert_eq!(state.locations().len(), 24);
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn invalid_settings_never_reach_the_engine() {
        let (mut ctl, engine) = controller(Vec::new());
        let mut bad = settings(10);
        bad.crossover_rate = 2.0;
        let err = ctl.initialize(&bad).unwrap_err();
        assert!(matches!(err, WorldError::Settings(_)));
        assert!(ctl.state().is_none());
        assert_eq!(engine.ledger.settings_built.get(), 0);
        assert_eq!(engine.ledger.worlds_built.get(), 0);
    }

    #[test]
    fn failed_reinitialize_preserves_the_previous_world() {
        let (mut ctl, engine) = controller(vec![5.0, 3.0, 9.0]);
        ctl.initialize(&settings(8)).unwrap();
        ctl.tick().unwrap();
        ctl.tick().unwrap();

        engine.fail_world.set(true);
        let err = ctl.initialize(&settings(12)).unwrap_err();
        assert!(matches!(err, WorldError::Engine(EngineError::Construction(_))));

        // Prior state is fully intact, including the best-ever record.
        let state = ctl.state().unwrap();
        assert_eq!(state.generation(), 2);
        assert_eq!(state.location_count(), 8);
        assert_eq!(state.best_fitness(), 9.0);
        assert_eq!(state.best_genome(), rotation(8, 2));

        // And the world keeps ticking.
        engine.fail_world.set(false);
        ctl.tick().unwrap();
        assert_eq!(ctl.state().unwrap().generation(), 3);
    }

    #[test]
    fn settings_handles_are_released_even_on_failure() {
        let (mut ctl, engine) = controller(Vec::new());
        ctl.initialize(&settings(8)).unwrap();
        assert_eq!(engine.ledger.settings_released.get(), 1);

        engine.fail_world.set(true);
        let _ = ctl.initialize(&settings(8));
        assert_eq!(engine.ledger.settings_built.get(), 2);
        assert_eq!(engine.ledger.settings_released.get(), 2);
    }

    #[test]
    fn genome_handles_are_released_on_replacement_and_teardown() {
        let (mut ctl, engine) = controller(Vec::new());
        ctl.initialize(&settings(8)).unwrap();
        ctl.tick().unwrap();
        ctl.tick().unwrap();
        // Three fittest handles fetched, two replaced so far.
        assert_eq!(engine.ledger.genomes_released.get(), 2);

        drop(ctl);
        assert_eq!(engine.ledger.genomes_released.get(), 3);
    }

    #[test]
    fn subscribers_run_in_registration_order_on_every_change() {
        let (mut ctl, _) = controller(Vec::new());
        let calls: Rc<RefCell<Vec<(char, u64)>>> = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&calls);
        ctl.on_change(move |state| log.borrow_mut().push(('a', state.generation())));
        let log = Rc::clone(&calls);
        ctl.on_change(move |state| log.borrow_mut().push(('b', state.generation())));

        ctl.initialize(&settings(6)).unwrap();
        ctl.tick().unwrap();
        ctl.tick().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![('a', 0), ('b', 0), ('a', 1), ('b', 1), ('a', 2), ('b', 2)]
        );
    }

    #[test]
    fn scene_reflects_controller_state() {
        let (mut ctl, _) = controller(Vec::new());
        ctl.initialize(&settings(10)).unwrap();
        ctl.tick().unwrap();

        let scene = TourScene::from_state(ctl.state().unwrap()).unwrap();
        // Closed tours: L segments need L + 1 points.
        assert_eq!(scene.current.len(), 11);
        assert_eq!(scene.best.len(), 11);
        assert_eq!(scene.markers.len(), 10);
    }

    #[test]
    fn hundred_tick_run_matches_the_reference_scenario() {
        let (mut ctl, _) = controller(Vec::new());
        ctl.initialize(&settings(10)).unwrap();
        let generation_zero_fitness = ctl.state().unwrap().current_fitness();

        for _ in 0..100 {
            ctl.tick().unwrap();
        }

        let state = ctl.state().unwrap();
        assert_eq!(state.generation(), 100);
        assert!(state.best_fitness() >= generation_zero_fitness);
        assert_eq!(state.best_genome().len(), 10);
    }
}
