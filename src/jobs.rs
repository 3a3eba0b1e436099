//! The job graph: parameterized computation units assembled into a DAG.
//!
//! Each node owns a job with typed input slots; connecting an output of
//! one node to a slot of another expresses a dependency. Running a node
//! evaluates its providers in topological order first. Cycles are refused.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use lin_alg::f64::Vec3;

use crate::config::{Config, ConfigNode};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::output::load_state;
use crate::paths::Path;
use crate::run::{handoff_sph_to_nbody, ResumeInfo, Run, RunCallbacks};
use crate::settings::{BodySettings, RunSettings, RunSettingsId, SettingsKey, SolverEnum};
use crate::solver::{create_solver, StabilizationSolver};
use crate::stats::{StatValue, Statistics, StatisticsId};
use crate::storage::Storage;

/// Types flowing between job nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobType {
    Particles,
    Material,
    Domain,
    Camera,
}

/// Minimal camera description consumed by rendering jobs; the renderer
/// itself lives outside this crate.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
}

/// Value produced by a job node.
pub enum JobOutput {
    Particles(Storage),
    Material(BodySettings),
    Domain(Domain),
    Camera(Camera),
}

impl JobOutput {
    pub fn job_type(&self) -> JobType {
        match self {
            Self::Particles(_) => JobType::Particles,
            Self::Material(_) => JobType::Material,
            Self::Domain(_) => JobType::Domain,
            Self::Camera(_) => JobType::Camera,
        }
    }

    /// Deep copy handed to additional dependents; storages duplicate
    /// without their user data.
    fn duplicate(&self) -> JobOutput {
        match self {
            Self::Particles(storage) => Self::Particles(storage.duplicate()),
            Self::Material(settings) => Self::Material(settings.clone()),
            Self::Domain(domain) => Self::Domain(domain.clone()),
            Self::Camera(camera) => Self::Camera(*camera),
        }
    }
}

/// Declared input slot of a job.
#[derive(Clone, Debug)]
pub struct SlotSpec {
    pub name: &'static str,
    pub slot_type: JobType,
    /// Slots may be disabled depending on the job parameters.
    pub used: bool,
}

/// Inputs and environment a job sees while evaluating.
pub struct JobContext<'a> {
    pub global: &'a RunSettings,
    pub inputs: HashMap<String, JobOutput>,
    pub callbacks: &'a mut dyn RunCallbacks,
}

impl JobContext<'_> {
    pub fn take_particles(&mut self, slot: &str) -> Result<Storage> {
        match self.inputs.remove(slot) {
            Some(JobOutput::Particles(storage)) => Ok(storage),
            _ => Err(Error::InvalidSetup(format!(
                "slot '{}' expects particles, nothing compatible is connected",
                slot
            ))),
        }
    }

    pub fn take_material(&mut self, slot: &str) -> Option<BodySettings> {
        match self.inputs.remove(slot) {
            Some(JobOutput::Material(settings)) => Some(settings),
            _ => None,
        }
    }

    pub fn take_domain(&mut self, slot: &str) -> Result<Domain> {
        match self.inputs.remove(slot) {
            Some(JobOutput::Domain(domain)) => Ok(domain),
            _ => Err(Error::InvalidSetup(format!(
                "slot '{}' expects a domain, nothing compatible is connected",
                slot
            ))),
        }
    }
}

/// A parameterized computation unit.
pub trait Job: Send {
    fn class_name(&self) -> &'static str;

    fn slots(&self) -> Vec<SlotSpec>;

    fn provides(&self) -> JobType;

    /// Loads the job parameters from its config node.
    fn load_settings(&mut self, _node: &ConfigNode) -> Result<()> {
        Ok(())
    }

    /// Writes the job parameters into its config node.
    fn save_settings(&self, _node: &mut ConfigNode) {}

    fn evaluate(&mut self, ctx: &mut JobContext<'_>) -> Result<JobOutput>;
}

/// Change notification published to node subscribers. Notifications are
/// queued and drained at a well-defined point to avoid reentrancy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    SettingsChanged,
    ProviderConnected { slot: String },
    ProviderDisconnected { slot: String },
}

pub type NodeId = usize;

struct JobNode {
    job: Box<dyn Job>,
    instance_name: String,
    providers: HashMap<String, NodeId>,
    subscribers: Vec<Sender<NodeEvent>>,
    queued_events: Vec<NodeEvent>,
}

/// Arena of job nodes with their connections.
#[derive(Default)]
pub struct JobGraph {
    nodes: Vec<JobNode>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, job: Box<dyn Job>, instance_name: &str) -> Result<NodeId> {
        if self.nodes.iter().any(|n| n.instance_name == instance_name) {
            return Err(Error::InvalidSetup(format!(
                "duplicate job instance name '{}'",
                instance_name
            )));
        }
        self.nodes.push(JobNode {
            job,
            instance_name: instance_name.to_string(),
            providers: HashMap::new(),
            subscribers: Vec::new(),
            queued_events: Vec::new(),
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn instance_name(&self, node: NodeId) -> &str {
        &self.nodes[node].instance_name
    }

    pub fn find_node(&self, instance_name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.instance_name == instance_name)
    }

    /// Subscribes to the change notifications of a node; events arrive
    /// when [`Self::flush_events`] is called.
    pub fn subscribe(&mut self, node: NodeId) -> Receiver<NodeEvent> {
        let (tx, rx) = channel();
        self.nodes[node].subscribers.push(tx);
        rx
    }

    /// Delivers all queued notifications to the subscribers.
    pub fn flush_events(&mut self) {
        for node in &mut self.nodes {
            for event in node.queued_events.drain(..) {
                node.subscribers
                    .retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }

    pub fn notify_settings_changed(&mut self, node: NodeId) {
        self.nodes[node].queued_events.push(NodeEvent::SettingsChanged);
    }

    /// Connects the output of `provider` to the named slot of `dependent`.
    pub fn connect(&mut self, provider: NodeId, dependent: NodeId, slot: &str) -> Result<()> {
        let provided = self.nodes[provider].job.provides();
        let slots = self.nodes[dependent].job.slots();
        let spec = slots
            .iter()
            .find(|s| s.name == slot)
            .ok_or_else(|| {
                Error::InvalidSetup(format!(
                    "job '{}' has no slot '{}'",
                    self.nodes[dependent].instance_name, slot
                ))
            })?;
        if spec.slot_type != provided {
            return Err(Error::InvalidSetup(format!(
                "slot '{}' of '{}' expects {:?}, provider '{}' produces {:?}",
                slot,
                self.nodes[dependent].instance_name,
                spec.slot_type,
                self.nodes[provider].instance_name,
                provided
            )));
        }
        self.nodes[dependent]
            .providers
            .insert(slot.to_string(), provider);
        self.nodes[dependent].queued_events.push(NodeEvent::ProviderConnected {
            slot: slot.to_string(),
        });
        Ok(())
    }

    pub fn disconnect(&mut self, dependent: NodeId, slot: &str) {
        if self.nodes[dependent].providers.remove(slot).is_some() {
            self.nodes[dependent]
                .queued_events
                .push(NodeEvent::ProviderDisconnected {
                    slot: slot.to_string(),
                });
        }
    }

    /// Evaluates the node and all its providers in topological order.
    /// On a fatal error the callbacks receive `on_end` with an empty
    /// storage and the error recorded in the statistics.
    pub fn run(
        &mut self,
        root: NodeId,
        global: &RunSettings,
        callbacks: &mut dyn RunCallbacks,
    ) -> Result<JobOutput> {
        let mut cache: HashMap<NodeId, JobOutput> = HashMap::new();
        let mut on_stack = vec![false; self.nodes.len()];
        let result = self.evaluate(root, global, callbacks, &mut cache, &mut on_stack);
        if let Err(e) = &result {
            let mut stats = Statistics::new();
            stats.set(StatisticsId::RunError, StatValue::Text(e.to_string()));
            callbacks.on_end(&Storage::new(), &stats);
        }
        result
    }

    /// Serializes the whole graph (and the global settings) into a config
    /// readable by [`graph_from_config`].
    pub fn to_config(&self, root: NodeId, global: &RunSettings) -> Config {
        let mut config = Config::new();
        let nodes = config.add_node("nodes");
        for node in &self.nodes {
            let child = nodes.add_child(&node.instance_name);
            child.set("class", node.job.class_name().to_string());
            node.job.save_settings(child);
            if !node.providers.is_empty() {
                let mut connections: Vec<(&String, &NodeId)> = node.providers.iter().collect();
                connections.sort();
                let providers = child.add_child("providers");
                for (slot, provider) in connections {
                    providers.set(slot, self.nodes[*provider].instance_name.clone());
                }
            }
        }
        let run = config.add_node("run");
        run.set("root", self.nodes[root].instance_name.clone());
        save_key_values(global, run);
        config
    }

    fn evaluate(
        &mut self,
        node: NodeId,
        global: &RunSettings,
        callbacks: &mut dyn RunCallbacks,
        cache: &mut HashMap<NodeId, JobOutput>,
        on_stack: &mut [bool],
    ) -> Result<JobOutput> {
        if let Some(cached) = cache.get(&node) {
            return Ok(cached.duplicate());
        }
        if on_stack[node] {
            return Err(Error::InvalidSetup(format!(
                "job graph contains a cycle through '{}'",
                self.nodes[node].instance_name
            )));
        }
        on_stack[node] = true;

        let providers: Vec<(String, NodeId)> = self.nodes[node]
            .providers
            .iter()
            .map(|(slot, id)| (slot.clone(), *id))
            .collect();
        let mut inputs = HashMap::new();
        for (slot, provider) in providers {
            let output = self.evaluate(provider, global, callbacks, cache, on_stack)?;
            inputs.insert(slot, output);
        }

        let name = self.nodes[node].instance_name.clone();
        callbacks.on_start(&name);
        let mut ctx = JobContext {
            global,
            inputs,
            callbacks,
        };
        let output = self.nodes[node].job.evaluate(&mut ctx)?;
        on_stack[node] = false;
        let result = output.duplicate();
        cache.insert(node, output);
        Ok(result)
    }
}

/////////////////////////////////////////////////////////////////////////
// Concrete jobs
/////////////////////////////////////////////////////////////////////////

/// Provides the material parameters of a body.
pub struct MaterialJob {
    pub body: BodySettings,
}

impl Job for MaterialJob {
    fn class_name(&self) -> &'static str {
        "material"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn provides(&self) -> JobType {
        JobType::Material
    }

    fn load_settings(&mut self, node: &ConfigNode) -> Result<()> {
        load_key_values(&mut self.body, node)
    }

    fn save_settings(&self, node: &mut ConfigNode) {
        save_key_values(&self.body, node);
    }

    fn evaluate(&mut self, _ctx: &mut JobContext<'_>) -> Result<JobOutput> {
        Ok(JobOutput::Material(self.body.clone()))
    }
}

/// Provides a spherical domain.
pub struct SphericalDomainJob {
    pub center: Vec3,
    pub radius: f64,
}

impl Job for SphericalDomainJob {
    fn class_name(&self) -> &'static str {
        "spherical_domain"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn provides(&self) -> JobType {
        JobType::Domain
    }

    fn load_settings(&mut self, node: &ConfigNode) -> Result<()> {
        if let Some(center) = node.try_get::<Vec3>("center") {
            self.center = center;
        }
        if let Some(radius) = node.try_get::<f64>("radius") {
            self.radius = radius;
        }
        Ok(())
    }

    fn save_settings(&self, node: &mut ConfigNode) {
        node.set("center", self.center);
        node.set("radius", self.radius);
    }

    fn evaluate(&mut self, _ctx: &mut JobContext<'_>) -> Result<JobOutput> {
        Ok(JobOutput::Domain(Domain::sphere(self.center, self.radius)))
    }
}

/// Provides a fixed camera for the interactive preview.
pub struct CameraJob {
    pub position: Vec3,
    pub target: Vec3,
}

impl Job for CameraJob {
    fn class_name(&self) -> &'static str {
        "camera"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn provides(&self) -> JobType {
        JobType::Camera
    }

    fn load_settings(&mut self, node: &ConfigNode) -> Result<()> {
        if let Some(position) = node.try_get::<Vec3>("position") {
            self.position = position;
        }
        if let Some(target) = node.try_get::<Vec3>("target") {
            self.target = target;
        }
        Ok(())
    }

    fn save_settings(&self, node: &mut ConfigNode) {
        node.set("position", self.position);
        node.set("target", self.target);
    }

    fn evaluate(&mut self, _ctx: &mut JobContext<'_>) -> Result<JobOutput> {
        Ok(JobOutput::Camera(Camera {
            position: self.position,
            target: self.target,
        }))
    }
}

/// Creates the particles of a monolithic body inside the connected
/// domain, using the connected material (or its own body settings).
pub struct MonolithicBodyIcJob {
    pub body: BodySettings,
    pub velocity: Vec3,
    pub spin: Vec3,
}

impl MonolithicBodyIcJob {
    pub fn new() -> Self {
        Self {
            body: BodySettings::new(),
            velocity: Vec3::new_zero(),
            spin: Vec3::new_zero(),
        }
    }
}

impl Default for MonolithicBodyIcJob {
    fn default() -> Self {
        Self::new()
    }
}

impl Job for MonolithicBodyIcJob {
    fn class_name(&self) -> &'static str {
        "monolithic_body"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec {
                name: "domain",
                slot_type: JobType::Domain,
                used: true,
            },
            SlotSpec {
                name: "material",
                slot_type: JobType::Material,
                used: true,
            },
        ]
    }

    fn provides(&self) -> JobType {
        JobType::Particles
    }

    fn load_settings(&mut self, node: &ConfigNode) -> Result<()> {
        if let Some(velocity) = node.try_get::<Vec3>("velocity") {
            self.velocity = velocity;
        }
        if let Some(spin) = node.try_get::<Vec3>("spin") {
            self.spin = spin;
        }
        load_key_values(&mut self.body, node)
    }

    fn save_settings(&self, node: &mut ConfigNode) {
        node.set("velocity", self.velocity);
        node.set("spin", self.spin);
        save_key_values(&self.body, node);
    }

    fn evaluate(&mut self, ctx: &mut JobContext<'_>) -> Result<JobOutput> {
        // prefer the connected domain, fall back to the one configured in
        // the global settings
        let domain = match ctx.take_domain("domain") {
            Ok(domain) => domain,
            Err(_) => crate::domain::require_domain(Domain::from_settings(ctx.global)?)?,
        };
        let body = ctx.take_material("material").unwrap_or_else(|| self.body.clone());
        let eta = ctx.global.get::<f64>(RunSettingsId::SphKernelEta)?;
        let seed = ctx.global.get::<i64>(RunSettingsId::RunRngSeed)? as u64;

        let mut storage = Storage::new();
        let count = crate::initial::add_monolithic_body(&mut storage, &domain, body, eta, seed)?;
        crate::initial::set_body_motion(&mut storage, count, self.velocity, self.spin)?;
        Ok(JobOutput::Particles(storage))
    }
}

/// Loads particles from a previously saved state file.
pub struct LoadStateJob {
    pub path: Path,
}

impl Job for LoadStateJob {
    fn class_name(&self) -> &'static str {
        "load_state"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        Vec::new()
    }

    fn provides(&self) -> JobType {
        JobType::Particles
    }

    fn load_settings(&mut self, node: &ConfigNode) -> Result<()> {
        self.path = node.get::<Path>("path")?;
        Ok(())
    }

    fn save_settings(&self, node: &mut ConfigNode) {
        node.set("path", self.path.clone());
    }

    fn evaluate(&mut self, _ctx: &mut JobContext<'_>) -> Result<JobOutput> {
        let (storage, _, _) = load_state(&self.path)?;
        Ok(JobOutput::Particles(storage))
    }
}

/// A simulation phase driving the run loop over the connected particles.
pub struct SimulationJob {
    /// Settings overriding the global ones for this phase.
    pub overrides: RunSettings,
    /// Wraps the solver in the stabilization decorator.
    pub stabilization: bool,
    /// Treats the input as N-body spheres, converting SPH particles on
    /// handoff.
    pub nbody: bool,
    /// Resume bookkeeping; explicit, never derived silently.
    pub resume: Option<ResumeInfo>,
}

impl SimulationJob {
    pub fn sph() -> Self {
        Self {
            overrides: RunSettings::new(),
            stabilization: false,
            nbody: false,
            resume: None,
        }
    }

    pub fn stabilization() -> Self {
        Self {
            stabilization: true,
            ..Self::sph()
        }
    }

    pub fn nbody() -> Self {
        let mut job = Self::sph();
        job.nbody = true;
        job.overrides.set(RunSettingsId::SolverType, SolverEnum::NBody);
        job
    }
}

impl Job for SimulationJob {
    fn class_name(&self) -> &'static str {
        if self.nbody {
            "nbody_run"
        } else if self.stabilization {
            "stabilization_run"
        } else {
            "sph_run"
        }
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![SlotSpec {
            name: "particles",
            slot_type: JobType::Particles,
            used: true,
        }]
    }

    fn provides(&self) -> JobType {
        JobType::Particles
    }

    fn load_settings(&mut self, node: &ConfigNode) -> Result<()> {
        // resuming is explicit: either all three resume entries are
        // present, or the phase starts fresh
        if let Some(start_time) = node.try_get::<f64>("resume_time") {
            self.resume = Some(ResumeInfo {
                start_time,
                timestep: node.get::<f64>("resume_timestep")?,
                output_index: node.get::<i64>("resume_output_index")?.max(0) as usize,
            });
        }
        load_key_values(&mut self.overrides, node)
    }

    fn save_settings(&self, node: &mut ConfigNode) {
        if let Some(resume) = self.resume {
            node.set("resume_time", resume.start_time);
            node.set("resume_timestep", resume.timestep);
            node.set("resume_output_index", resume.output_index as i64);
        }
        save_key_values(&self.overrides, node);
    }

    fn evaluate(&mut self, ctx: &mut JobContext<'_>) -> Result<JobOutput> {
        let mut storage = ctx.take_particles("particles")?;

        let mut settings = ctx.global.clone();
        settings.add_entries(&self.overrides);

        if self.nbody {
            // previous phases may hand over SPH particles
            handoff_sph_to_nbody(&mut storage)?;
        }

        let mut run = Run::new(settings.clone())?;
        if self.stabilization {
            let inner = create_solver(&settings, run.scheduler())?;
            run = run.with_solver(Box::new(StabilizationSolver::new(inner, &settings)?));
        }
        if let Some(resume) = self.resume {
            run = run.with_resume(resume);
        }
        run.run(&mut storage, ctx.callbacks)?;
        Ok(JobOutput::Particles(storage))
    }
}

/// Saves the connected particles into a state file and passes them on.
pub struct SaveStateJob {
    pub path: Path,
}

impl Job for SaveStateJob {
    fn class_name(&self) -> &'static str {
        "save_state"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        vec![SlotSpec {
            name: "particles",
            slot_type: JobType::Particles,
            used: true,
        }]
    }

    fn provides(&self) -> JobType {
        JobType::Particles
    }

    fn load_settings(&mut self, node: &ConfigNode) -> Result<()> {
        self.path = node.get::<Path>("path")?;
        Ok(())
    }

    fn save_settings(&self, node: &mut ConfigNode) {
        node.set("path", self.path.clone());
    }

    fn evaluate(&mut self, ctx: &mut JobContext<'_>) -> Result<JobOutput> {
        let storage = ctx.take_particles("particles")?;
        let state =
            crate::output::serialize_state(&storage, ctx.global, 0., 0., 0)?;
        let bytes = bincode::encode_to_vec(&state, bincode::config::standard())
            .map_err(|e| Error::InvalidSetup(e.to_string()))?;
        if let Some(parent) = self.path.to_std().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(self.path.to_std(), bytes)?;
        Ok(JobOutput::Particles(storage))
    }
}

fn load_key_values<K: SettingsKey>(
    settings: &mut crate::settings::Settings<K>,
    node: &ConfigNode,
) -> Result<()> {
    for key in K::all() {
        if let Some(text) = node.try_get::<String>(key.name()) {
            let value = key
                .default_value()
                .parse_as(&text)
                .ok_or_else(|| Error::InvalidValue {
                    key: key.name().to_string(),
                    value: text,
                })?;
            settings.set_raw(*key, value);
        }
    }
    Ok(())
}

fn save_key_values<K: SettingsKey>(settings: &crate::settings::Settings<K>, node: &mut ConfigNode) {
    for (key, value) in settings.iter() {
        if settings.is_set(key) {
            node.set(key.name(), value.write());
        }
    }
}

/// Creates a job of the given registered class.
pub fn create_job(class: &str) -> Result<Box<dyn Job>> {
    match class {
        "material" => Ok(Box::new(MaterialJob {
            body: BodySettings::new(),
        })),
        "spherical_domain" => Ok(Box::new(SphericalDomainJob {
            center: Vec3::new_zero(),
            radius: 1e4,
        })),
        "camera" => Ok(Box::new(CameraJob {
            position: Vec3::new(0., 0., 1e5),
            target: Vec3::new_zero(),
        })),
        "monolithic_body" => Ok(Box::new(MonolithicBodyIcJob::new())),
        "load_state" => Ok(Box::new(LoadStateJob { path: Path::empty() })),
        "save_state" => Ok(Box::new(SaveStateJob { path: Path::empty() })),
        "sph_run" => Ok(Box::new(SimulationJob::sph())),
        "stabilization_run" => Ok(Box::new(SimulationJob::stabilization())),
        "nbody_run" => Ok(Box::new(SimulationJob::nbody())),
        other => Err(Error::InvalidSetup(format!("unknown job class '{}'", other))),
    }
}

/// Builds the job graph from a config:
///
/// ```text
/// "nodes" [
///   "target ic" [
///     "class" = "monolithic_body"
///     "sph.particle_count" = 10000
///     "providers" [
///       "domain" = "target domain"
///     ]
///   ]
/// ]
/// "run" [
///   "root" = "impact sim"
///   "run.time_range" = 0 10
/// ]
/// ```
///
/// Returns the graph, the root node and the global run settings read from
/// the "run" node.
pub fn graph_from_config(config: &Config) -> Result<(JobGraph, NodeId, RunSettings)> {
    let mut graph = JobGraph::new();
    let nodes = config.get_node("nodes")?;

    // first pass creates the nodes, the second connects the providers
    let mut connections: Vec<(NodeId, String, String)> = Vec::new();
    {
        let mut error = None;
        nodes.enumerate_children(&mut |name, node| {
            if error.is_some() {
                return;
            }
            // nested "providers" nodes are not jobs
            if name == "providers" {
                return;
            }
            let result = (|| -> Result<()> {
                let class = node.get::<String>("class")?;
                let mut job = create_job(&class)?;
                job.load_settings(node)?;
                let id = graph.add_node(job, name)?;
                if let Ok(providers) = node.get_child("providers") {
                    for slot in provider_entries(providers) {
                        let provider_name = providers.get::<String>(&slot)?;
                        connections.push((id, slot, provider_name));
                    }
                }
                Ok(())
            })();
            if let Err(e) = result {
                error = Some(e);
            }
        });
        if let Some(e) = error {
            return Err(e);
        }
    }

    for (dependent, slot, provider_name) in connections {
        let provider = graph.find_node(&provider_name).ok_or_else(|| {
            Error::InvalidSetup(format!("unknown provider node '{}'", provider_name))
        })?;
        graph.connect(provider, dependent, &slot)?;
    }

    let run_node = config.get_node("run")?;
    let root_name = run_node.get::<String>("root")?;
    let root = graph
        .find_node(&root_name)
        .ok_or_else(|| Error::InvalidSetup(format!("unknown root node '{}'", root_name)))?;

    let mut global = RunSettings::new();
    load_key_values(&mut global, run_node)?;
    Ok((graph, root, global))
}

fn provider_entries(node: &ConfigNode) -> Vec<String> {
    node.entry_names()
}
