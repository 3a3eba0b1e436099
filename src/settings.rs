//! Typed, enumerated settings for the run and for individual bodies.
//!
//! A [`Settings`] object stores overrides on top of a process-wide table of
//! defaults; reading an untouched key returns its default. Values are typed
//! and a read with the wrong type is an error, not a conversion. Enums and
//! flag unions carry their name table so they serialise as human-readable
//! text (`COURANT | DERIVATIVES`).

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::marker::PhantomData;

use lin_alg::f64::Vec3;

use crate::error::{Error, Result};
use crate::math::{Interval, SymmetricTensor, TracelessTensor};
use crate::paths::Path;

/// Name <-> value table of an enum usable inside [`Settings`].
#[derive(Debug, PartialEq, Eq)]
pub struct EnumTable {
    pub type_name: &'static str,
    pub entries: &'static [(u32, &'static str)],
}

impl EnumTable {
    pub fn name_of(&self, raw: u32) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(value, _)| *value == raw)
            .map(|(_, name)| *name)
    }

    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(value, _)| *value)
    }
}

/// Enumeration storable in settings, together with its name table.
pub trait SettingsEnum: Copy + 'static {
    fn table() -> &'static EnumTable;
    fn to_raw(self) -> u32;
    fn from_raw(raw: u32) -> Option<Self>
    where
        Self: Sized;
}

/// Set of flags over a [`SettingsEnum`] with power-of-two values.
pub struct FlagSet<E: SettingsEnum> {
    bits: u32,
    _marker: PhantomData<E>,
}

impl<E: SettingsEnum> FlagSet<E> {
    pub fn empty() -> Self {
        Self {
            bits: 0,
            _marker: PhantomData,
        }
    }

    pub fn of(flags: &[E]) -> Self {
        let mut bits = 0;
        for f in flags {
            bits |= f.to_raw();
        }
        Self {
            bits,
            _marker: PhantomData,
        }
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            bits,
            _marker: PhantomData,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn has(&self, flag: E) -> bool {
        self.bits & flag.to_raw() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn insert(&mut self, flag: E) {
        self.bits |= flag.to_raw();
    }
}

impl<E: SettingsEnum> Clone for FlagSet<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: SettingsEnum> Copy for FlagSet<E> {}

impl<E: SettingsEnum> std::fmt::Debug for FlagSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FlagSet({})", flags_to_string(E::table(), self.bits))
    }
}

/// A value of one of the closed set of types settings can hold.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Interval(Interval),
    Str(String),
    Vector(Vec3),
    Tensor(SymmetricTensor),
    Traceless(TracelessTensor),
    Enum {
        table: &'static EnumTable,
        raw: u32,
    },
    Flags {
        table: &'static EnumTable,
        raw: u32,
    },
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Interval(a), Interval(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Vector(a), Vector(b)) => a.x == b.x && a.y == b.y && a.z == b.z,
            (Tensor(a), Tensor(b)) => a == b,
            (Traceless(a), Traceless(b)) => a == b,
            (Enum { table: t1, raw: r1 }, Enum { table: t2, raw: r2 }) => {
                t1.type_name == t2.type_name && r1 == r2
            }
            (Flags { table: t1, raw: r1 }, Flags { table: t2, raw: r2 }) => {
                t1.type_name == t2.type_name && r1 == r2
            }
            _ => false,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Interval(_) => "interval",
            Value::Str(_) => "string",
            Value::Vector(_) => "vector",
            Value::Tensor(_) => "tensor",
            Value::Traceless(_) => "traceless tensor",
            Value::Enum { table, .. } => table.type_name,
            Value::Flags { .. } => "flags",
        }
    }

    /// Serialises the value the way the settings file stores it.
    pub fn write(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => float_to_string(*f),
            Value::Interval(i) => {
                format!("{} {}", float_to_string(i.lower()), float_to_string(i.upper()))
            }
            Value::Str(s) => s.clone(),
            Value::Vector(v) => format!(
                "{} {} {}",
                float_to_string(v.x),
                float_to_string(v.y),
                float_to_string(v.z)
            ),
            Value::Tensor(t) => {
                let mut out = String::new();
                for c in t.diag.iter().chain(t.off.iter()) {
                    let _ = write!(out, "{} ", float_to_string(*c));
                }
                out.trim_end().to_string()
            }
            Value::Traceless(t) => format!(
                "{} {} {} {} {}",
                float_to_string(t.xx),
                float_to_string(t.yy),
                float_to_string(t.xy),
                float_to_string(t.xz),
                float_to_string(t.yz)
            ),
            Value::Enum { table, raw } => table
                .name_of(*raw)
                .map(str::to_string)
                .unwrap_or_else(|| raw.to_string()),
            Value::Flags { table, raw } => flags_to_string(table, *raw),
        }
    }

    /// Parses `text` as a value of the same type as `self`.
    pub fn parse_as(&self, text: &str) -> Option<Value> {
        let text = text.trim();
        match self {
            Value::Bool(_) => match text {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Int(_) => text.parse().ok().map(Value::Int),
            Value::Float(_) => parse_float(text).map(Value::Float),
            Value::Interval(_) => {
                let mut parts = text.split_whitespace();
                let lower = parse_float(parts.next()?)?;
                let upper = parse_float(parts.next()?)?;
                Some(Value::Interval(Interval::new(lower, upper)))
            }
            Value::Str(_) => Some(Value::Str(text.to_string())),
            Value::Vector(_) => {
                let v: Vec<f64> = text.split_whitespace().filter_map(parse_float_ref).collect();
                if v.len() != 3 {
                    return None;
                }
                Some(Value::Vector(Vec3::new(v[0], v[1], v[2])))
            }
            Value::Tensor(_) => {
                let v: Vec<f64> = text.split_whitespace().filter_map(parse_float_ref).collect();
                if v.len() != 6 {
                    return None;
                }
                Some(Value::Tensor(SymmetricTensor::new(
                    [v[0], v[1], v[2]],
                    [v[3], v[4], v[5]],
                )))
            }
            Value::Traceless(_) => {
                let v: Vec<f64> = text.split_whitespace().filter_map(parse_float_ref).collect();
                if v.len() != 5 {
                    return None;
                }
                Some(Value::Traceless(TracelessTensor::new(
                    v[0], v[1], v[2], v[3], v[4],
                )))
            }
            Value::Enum { table, .. } => {
                let raw = table
                    .value_of(text)
                    .or_else(|| text.parse().ok().filter(|r| table.name_of(*r).is_some()))?;
                Some(Value::Enum { table, raw })
            }
            Value::Flags { table, .. } => {
                if text == "0" {
                    return Some(Value::Flags { table, raw: 0 });
                }
                let mut raw = 0;
                for name in text.split('|') {
                    raw |= table.value_of(name.trim())?;
                }
                Some(Value::Flags { table, raw })
            }
        }
    }
}

fn flags_to_string(table: &EnumTable, raw: u32) -> String {
    if raw == 0 {
        return "0".to_string();
    }
    table
        .entries
        .iter()
        .filter(|(value, _)| raw & value != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn float_to_string(f: f64) -> String {
    if f == f64::INFINITY {
        "infinity".to_string()
    } else if f == f64::NEG_INFINITY {
        "-infinity".to_string()
    } else {
        f.to_string()
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "infinity" => Some(f64::INFINITY),
        "-infinity" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok(),
    }
}

fn parse_float_ref(text: &str) -> Option<f64> {
    parse_float(text)
}

/// Conversion between a Rust type and the stored [`Value`] variant.
pub trait SettingValue: Sized {
    fn requested_type() -> &'static str;
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_setting_value {
    ($type:ty, $variant:ident, $name:literal) => {
        impl SettingValue for $type {
            fn requested_type() -> &'static str {
                $name
            }
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_setting_value!(bool, Bool, "bool");
impl_setting_value!(i64, Int, "int");
impl_setting_value!(f64, Float, "float");
impl_setting_value!(Interval, Interval, "interval");
impl_setting_value!(String, Str, "string");
impl_setting_value!(Vec3, Vector, "vector");
impl_setting_value!(SymmetricTensor, Tensor, "tensor");
impl_setting_value!(TracelessTensor, Traceless, "traceless tensor");

impl<E: SettingsEnum> SettingValue for FlagSet<E> {
    fn requested_type() -> &'static str {
        "flags"
    }
    fn into_value(self) -> Value {
        Value::Flags {
            table: E::table(),
            raw: self.bits(),
        }
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Flags { table, raw } if table.type_name == E::table().type_name => {
                Some(FlagSet::from_bits(*raw))
            }
            _ => None,
        }
    }
}

/// Declares an enumeration usable in settings, with its name table.
macro_rules! settings_enum {
    ($(#[$attr:meta])* $name:ident, $type_name:literal, { $($(#[$vattr:meta])* $variant:ident = $raw:literal => $str:literal,)+ }) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {
            $($(#[$vattr])* $variant = $raw,)+
        }

        impl SettingsEnum for $name {
            fn table() -> &'static EnumTable {
                static TABLE: EnumTable = EnumTable {
                    type_name: $type_name,
                    entries: &[$(($raw, $str),)+],
                };
                &TABLE
            }

            fn to_raw(self) -> u32 {
                self as u32
            }

            fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $($raw => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl SettingValue for $name {
            fn requested_type() -> &'static str {
                $type_name
            }
            fn into_value(self) -> Value {
                Value::Enum {
                    table: Self::table(),
                    raw: self.to_raw(),
                }
            }
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Enum { table, raw } if table.type_name == $type_name => {
                        Self::from_raw(*raw)
                    }
                    _ => None,
                }
            }
        }
    };
}

settings_enum!(
    /// SPH smoothing kernels.
    KernelEnum, "KernelEnum", {
        /// M4 B-spline (piecewise cubic polynomial)
        CubicSpline = 0 => "CUBIC_SPLINE",
        /// M5 B-spline (piecewise 4th-order polynomial)
        FourthOrderSpline = 1 => "FOURTH_ORDER_SPLINE",
        /// Core Triangle kernel by Read et al. (2010)
        CoreTriangle = 2 => "CORE_TRIANGLE",
    }
);

settings_enum!(
    /// Integration schemes.
    TimesteppingEnum, "TimesteppingEnum", {
        EulerExplicit = 0 => "EULER_EXPLICIT",
        Leapfrog = 1 => "LEAP_FROG",
        RungeKutta = 2 => "RUNGE_KUTTA",
        PredictorCorrector = 3 => "PREDICTOR_CORRECTOR",
        ModifiedMidpoint = 4 => "MODIFIED_MIDPOINT",
        BulirschStoer = 5 => "BULIRSCH_STOER",
    }
);

settings_enum!(
    /// Spatial index used for neighbour queries.
    FinderEnum, "FinderEnum", {
        /// O(N^2) search through every pair; only useful for tests.
        BruteForce = 0 => "BRUTE_FORCE",
        UniformGrid = 1 => "UNIFORM_GRID",
        KdTree = 2 => "KD_TREE",
        LinkedList = 3 => "LINKED_LIST",
        HashMap = 4 => "HASH_MAP",
        Octree = 5 => "OCTREE",
    }
);

settings_enum!(
    /// Derivative solvers.
    SolverEnum, "SolverEnum", {
        /// SPH evaluation accumulating only into the i-th particle.
        Asymmetric = 0 => "ASYMMETRIC_SOLVER",
        /// SPH evaluation accumulating into both particles of a pair,
        /// conserving momentum exactly.
        Symmetric = 1 => "SYMMETRIC_SOLVER",
        /// Gravity-only solver without SPH derivatives.
        NBody = 2 => "N_BODY_SOLVER",
    }
);

settings_enum!(
    /// Forces included by the SPH solver, combined as flags.
    ForceEnum, "ForceEnum", {
        PressureGradient = 1 => "PRESSURE_GRADIENT",
        SolidStress = 2 => "SOLID_STRESS",
        SelfGravity = 4 => "SELF_GRAVITY",
        ConstantAcceleration = 8 => "CONSTANT_ACCELERATION",
        /// Coriolis and centrifugal terms of a rotating frame.
        Inertial = 16 => "INERTIAL",
        SurfaceTension = 32 => "SURFACE_TENSION",
    }
);

settings_enum!(
    ArtificialViscosityEnum, "ArtificialViscosityEnum", {
        None = 0 => "NONE",
        /// Standard artificial viscosity term by Monaghan (1989).
        Standard = 1 => "STANDARD",
        /// Term analogous to Riemann solvers by Monaghan (1997).
        Riemann = 2 => "RIEMANN",
        /// Time-dependent viscosity by Morris & Monaghan (1997).
        MorrisMonaghan = 3 => "MORRIS_MONAGHAN",
    }
);

settings_enum!(
    /// Smoothing-length evolution, combined as flags; empty means the
    /// smoothing length stays constant.
    SmoothingLengthEnum, "SmoothingLengthEnum", {
        /// dh/dt = h/3 div v, consistent with the continuity equation.
        ContinuityEquation = 1 => "CONTINUITY_EQUATION",
        /// Term enforcing the neighbour count, scaled by local sound speed.
        SoundSpeedEnforcing = 2 => "SOUND_SPEED_ENFORCING",
    }
);

settings_enum!(
    TimeStepCriterionEnum, "TimeStepCriterionEnum", {
        Courant = 1 => "COURANT",
        Derivatives = 2 => "DERIVATIVES",
        Acceleration = 4 => "ACCELERATION",
        Divergence = 8 => "DIVERGENCE",
    }
);

settings_enum!(
    GravityEnum, "GravityEnum", {
        /// Brute-force summation over all particle pairs.
        BruteForce = 0 => "BRUTE_FORCE",
        /// Barnes & Hut (1986) approximative evaluation with a tree.
        BarnesHut = 1 => "BARNES_HUT",
        /// Point mass in the center; particles do not attract each other.
        SphericalPotential = 2 => "SPHERICAL",
    }
);

settings_enum!(
    CollisionHandlerEnum, "CollisionHandlerEnum", {
        None = 0 => "NONE",
        PerfectMerging = 1 => "PERFECT_MERGING",
        ElasticBounce = 2 => "ELASTIC_BOUNCE",
        /// Merge if the relative speed is below the mutual escape speed,
        /// bounce otherwise.
        MergeOrBounce = 3 => "MERGE_OR_BOUNCE",
        /// Keep colliding particles in rigid aggregates.
        Aggregates = 4 => "AGGREGATES",
    }
);

settings_enum!(
    OverlapHandlerEnum, "OverlapHandlerEnum", {
        Ignore = 0 => "NONE",
        ForceMerge = 1 => "FORCE_MERGE",
        Repel = 2 => "REPEL",
        RepelOrMerge = 3 => "REPEL_OR_MERGE",
        InternalBounce = 4 => "INTERNAL_BOUNCE",
        PassOrMerge = 5 => "PASS_OR_MERGE",
    }
);

settings_enum!(
    EosEnum, "EosEnum", {
        IdealGas = 0 => "IDEAL_GAS",
        /// Tillotson (1962) equation of state.
        Tillotson = 1 => "TILLOTSON",
        /// ANEOS given by a look-up table.
        Aneos = 2 => "ANEOS",
    }
);

settings_enum!(
    YieldingEnum, "YieldingEnum", {
        /// Elastic deformation following Hooke's law, no yielding.
        None = 0 => "NONE",
        VonMises = 1 => "VON_MISES",
    }
);

settings_enum!(
    DamageEnum, "DamageEnum", {
        None = 0 => "NONE",
        /// Grady-Kipp model of fragmentation using scalar damage.
        ScalarGradyKipp = 1 => "SCALAR_GRADY_KIPP",
    }
);

settings_enum!(
    DistributionEnum, "DistributionEnum", {
        /// Hexagonally close packing.
        Hexagonal = 0 => "HEXAGONAL",
        /// Cubic close packing.
        Cubic = 1 => "CUBIC",
        /// Random positions with uniform density.
        Random = 2 => "RANDOM",
        /// Particles uniformly on a line.
        Linear = 3 => "LINEAR",
    }
);

settings_enum!(
    DomainEnum, "DomainEnum", {
        None = 0 => "NONE",
        Spherical = 1 => "SPHERICAL",
        Block = 2 => "BLOCK",
        Cylinder = 3 => "CYLINDER",
    }
);

settings_enum!(
    OutputTypeEnum, "OutputTypeEnum", {
        None = 0 => "NONE",
        /// Tab-separated columns, one row per particle.
        Text = 1 => "TEXT_FILE",
        /// Lossless binary dump, allows resuming the run.
        BinaryState = 2 => "STATE_FILE",
        /// Compact binary with a curated subset of quantities.
        CompactData = 3 => "DATA_FILE",
        /// Unstructured grid for external visualisation.
        Vtk = 4 => "VTK_FILE",
        /// Cumulative size-frequency distribution of fragments.
        Sfd = 5 => "SFD_FILE",
    }
);

settings_enum!(
    /// Columns of the text output, combined as flags.
    OutputQuantityEnum, "OutputQuantityEnum", {
        Index = 1 => "INDEX",
        Position = 2 => "POSITION",
        Velocity = 4 => "VELOCITY",
        SmoothingLength = 8 => "SMOOTHING_LENGTH",
        Mass = 16 => "MASS",
        Density = 32 => "DENSITY",
        Pressure = 64 => "PRESSURE",
        Energy = 128 => "ENERGY",
        Damage = 256 => "DAMAGE",
        DeviatoricStress = 512 => "DEVIATORIC_STRESS",
    }
);

settings_enum!(
    LoggerEnum, "LoggerEnum", {
        None = 0 => "NONE",
        Stdout = 1 => "STD_OUT",
        File = 2 => "FILE",
    }
);

settings_enum!(
    /// How particles are initially grouped into aggregates.
    AggregateEnum, "AggregateEnum", {
        /// Each particle forms its own aggregate.
        Particles = 0 => "PARTICLES",
        /// Each material partition forms one aggregate.
        Materials = 1 => "MATERIALS",
    }
);

/// Key of a settings domain; provides the dotted name, the canonical
/// default and the deterministic enumeration order of all keys.
pub trait SettingsKey: Copy + Ord + std::fmt::Debug + 'static {
    fn name(self) -> &'static str;
    fn default_value(self) -> Value;
    fn all() -> &'static [Self]
    where
        Self: Sized;

    fn from_name(name: &str) -> Option<Self>
    where
        Self: Sized,
    {
        Self::all().iter().find(|k| k.name() == name).copied()
    }
}

/// Generic storage of settings; stores only the overrides, reads fall back
/// to the defaults table.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings<K: SettingsKey> {
    entries: BTreeMap<K, Value>,
}

impl<K: SettingsKey> Default for Settings<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: SettingsKey> Settings<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the value. A type mismatch against the default is a bug and
    /// asserts in debug builds; in release the value overrides.
    pub fn set<T: SettingValue>(&mut self, key: K, value: T) -> &mut Self {
        let value = value.into_value();
        debug_assert_eq!(
            value.type_name(),
            key.default_value().type_name(),
            "setting {:?} with a value of the wrong type",
            key
        );
        self.entries.insert(key, value);
        self
    }

    /// Records an already-typed value, bypassing the conversion; used by
    /// the state-file loader.
    pub fn set_raw(&mut self, key: K, value: Value) {
        self.entries.insert(key, value);
    }

    /// Returns the stored value, falling back to the default.
    pub fn get<T: SettingValue>(&self, key: K) -> Result<T> {
        let value = match self.entries.get(&key) {
            Some(value) => value.clone(),
            None => key.default_value(),
        };
        let stored = value.type_name();
        T::from_value(&value).ok_or_else(|| Error::TypeMismatch {
            key: key.name().to_string(),
            stored,
            requested: T::requested_type(),
        })
    }

    /// Variant of get for bitwise enumerations.
    pub fn get_flags<E: SettingsEnum>(&self, key: K) -> Result<FlagSet<E>> {
        self.get::<FlagSet<E>>(key)
    }

    /// True iff the key holds (or defaults to) a value of type T.
    pub fn has_type<T: SettingValue>(&self, key: K) -> bool {
        let value = match self.entries.get(&key) {
            Some(value) => value.clone(),
            None => key.default_value(),
        };
        T::from_value(&value).is_some()
    }

    /// True if the key was explicitly set.
    pub fn is_set(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// Overwrites local values by every key present in `other`; keys not in
    /// `other` are left untouched.
    pub fn add_entries(&mut self, other: &Settings<K>) {
        for (key, value) in &other.entries {
            self.entries.insert(*key, value.clone());
        }
    }

    /// Iterates over all keys in deterministic (declaration) order,
    /// yielding the effective value of each.
    pub fn iter(&self) -> impl Iterator<Item = (K, Value)> + '_ {
        K::all().iter().map(move |key| {
            let value = self
                .entries
                .get(key)
                .cloned()
                .unwrap_or_else(|| key.default_value());
            (*key, value)
        })
    }

    /// Persists all keys as `name = value` lines, in stable key order.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        for (key, value) in self.iter() {
            let _ = writeln!(out, "{:<40} = {}", key.name(), value.write());
        }
        fs::write(path.to_std(), out)?;
        Ok(())
    }

    /// Loads settings from the text format written by [`Self::save_to_file`].
    /// Unknown keys and malformed values are errors.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path.to_std())?;
        for line in content.lines() {
            let line = line.trim_end_matches('\r').trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, text) = line
                .split_once('=')
                .ok_or_else(|| Error::ConfigParse {
                    line: line.to_string(),
                })?;
            let name = name.trim();
            let key = K::from_name(name).ok_or_else(|| Error::UnknownKey(name.to_string()))?;
            let template = key.default_value();
            let value = template
                .parse_as(text.trim())
                .ok_or_else(|| Error::InvalidValue {
                    key: name.to_string(),
                    value: text.trim().to_string(),
                })?;
            self.entries.insert(key, value);
        }
        Ok(())
    }
}

macro_rules! settings_keys {
    ($(#[$attr:meta])* $enum_name:ident, { $($(#[$kattr:meta])* $key:ident = $name:literal => $default:expr,)+ }) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
        pub enum $enum_name {
            $($(#[$kattr])* $key,)+
        }

        impl SettingsKey for $enum_name {
            fn name(self) -> &'static str {
                match self {
                    $(Self::$key => $name,)+
                }
            }

            fn default_value(self) -> Value {
                match self {
                    $(Self::$key => $default,)+
                }
            }

            fn all() -> &'static [Self] {
                &[$(Self::$key,)+]
            }
        }
    };
}

fn enum_value<E: SettingsEnum>(value: E) -> Value {
    Value::Enum {
        table: E::table(),
        raw: value.to_raw(),
    }
}

fn flags_value<E: SettingsEnum>(flags: &[E]) -> Value {
    Value::Flags {
        table: E::table(),
        raw: FlagSet::of(flags).bits(),
    }
}

settings_keys!(
    /// Settings relevant for the whole run of the simulation.
    RunSettingsId, {
        /// Custom name of the run.
        RunName = "run.name" => Value::Str("unnamed run".into()),
        /// Time range of the simulation, in seconds.
        RunTimeRange = "run.time_range" => Value::Interval(Interval::new(0., 10.)),
        /// Hard limit on the number of timesteps; zero means unlimited.
        RunTimestepCnt = "run.timestep_cnt" => Value::Int(0),
        /// Hard limit on the wallclock duration in seconds; zero means unlimited.
        RunWallclockTime = "run.wallclock_time" => Value::Float(0.),
        /// Seed of the deterministic random stream.
        RunRngSeed = "run.rng.seed" => Value::Int(1234),
        /// Selected output writer.
        RunOutputType = "run.output.type" => enum_value(OutputTypeEnum::Text),
        /// Time between snapshots, in simulation seconds.
        RunOutputInterval = "run.output.interval" => Value::Float(0.1),
        /// First value of the snapshot counter; nonzero when resuming.
        RunOutputFirstIndex = "run.output.first_index" => Value::Int(0),
        /// File mask of snapshots; %d expands to the snapshot counter and
        /// %e to the quantity name where applicable.
        RunOutputName = "run.output.name" => Value::Str("out_%d.txt".into()),
        /// Directory all output files of the phase are written into.
        RunOutputPath = "run.output.path" => Value::Str("out".into()),
        /// Columns of the text output.
        RunOutputQuantities = "run.output.quantities" => flags_value(&[
            OutputQuantityEnum::Position,
            OutputQuantityEnum::Velocity,
            OutputQuantityEnum::SmoothingLength,
            OutputQuantityEnum::Mass,
            OutputQuantityEnum::Density,
            OutputQuantityEnum::Pressure,
            OutputQuantityEnum::Energy,
        ]),
        RunLogger = "run.logger" => enum_value(LoggerEnum::Stdout),
        RunLoggerFile = "run.logger.file" => Value::Str("log.txt".into()),
        /// Number of timesteps between finite-value diagnostics; zero disables.
        RunDiagnosticsInterval = "run.diagnostics.interval" => Value::Int(100),
        /// Worker threads of the scheduler; zero selects the hardware count.
        RunThreadCnt = "run.thread.cnt" => Value::Int(0),
        /// Number of particles processed per parallel task.
        RunThreadGranularity = "run.thread.granularity" => Value::Int(1000),

        SolverType = "solver.type" => enum_value(SolverEnum::Asymmetric),
        SolverForces = "solver.forces" => flags_value(&[
            ForceEnum::PressureGradient,
            ForceEnum::SolidStress,
        ]),
        /// Constant external acceleration applied to all particles.
        SolverConstantAcceleration = "solver.constant_acceleration" => Value::Vector(Vec3::new_zero()),
        /// Angular frequency of the (non-inertial) reference frame.
        FrameAngularFrequency = "frame.angular_frequency" => Value::Vector(Vec3::new_zero()),

        SphKernel = "sph.kernel" => enum_value(KernelEnum::CubicSpline),
        /// Eta-factor between the smoothing length and particle spacing.
        SphKernelEta = "sph.kernel.eta" => Value::Float(1.3),
        SphFinder = "sph.finder" => enum_value(FinderEnum::KdTree),
        SphFinderLeafSize = "sph.finder.leaf_size" => Value::Int(25),
        SphAvType = "sph.av.type" => enum_value(ArtificialViscosityEnum::Standard),
        SphAvAlpha = "sph.av.alpha" => Value::Float(1.5),
        SphAvBeta = "sph.av.beta" => Value::Float(3.),
        /// Range of the alpha coefficient of the Morris & Monaghan viscosity.
        SphAvAlphaRange = "sph.av.alpha.range" => Value::Interval(Interval::new(0.05, 1.5)),
        SphAvBalsara = "sph.av.balsara" => Value::Bool(false),
        SphSmoothingLength = "sph.smoothing_length" => Value::Flags {
            table: SmoothingLengthEnum::table(),
            raw: 0,
        },
        /// Allowed range of neighbour counts of the enforcing term.
        SphNeighbourRange = "sph.neighbour.range" => Value::Interval(Interval::new(25., 100.)),
        SphNeighbourEnforcing = "sph.neighbour.enforcing" => Value::Float(0.2),

        TimesteppingIntegrator = "timestep.integrator" => enum_value(TimesteppingEnum::PredictorCorrector),
        TimesteppingCourant = "timestep.courant" => Value::Float(0.2),
        TimesteppingDerivativeFactor = "timestep.derivative_factor" => Value::Float(0.2),
        TimesteppingAccelerationFactor = "timestep.acceleration_factor" => Value::Float(0.2),
        TimesteppingDivergenceFactor = "timestep.divergence_factor" => Value::Float(0.005),
        /// Upper limit of the timestep, in seconds.
        TimesteppingMaxTimestep = "timestep.max_step" => Value::Float(10.),
        TimesteppingInitialTimestep = "timestep.initial" => Value::Float(0.03),
        TimesteppingCriterion = "timestep.criterion" => flags_value(&[
            TimeStepCriterionEnum::Courant,
            TimeStepCriterionEnum::Derivatives,
            TimeStepCriterionEnum::Acceleration,
        ]),
        /// Exponent of the generalized mean combining criteria; negative
        /// infinity selects the minimum.
        TimesteppingMeanPower = "timestep.mean_power" => Value::Float(f64::NEG_INFINITY),
        /// Maximum relative growth of the timestep between steps.
        TimesteppingMaxChange = "timestep.max_change" => Value::Float(2.),
        /// Number of substeps of the modified midpoint method.
        TimesteppingMidpointCount = "timestep.midpoint_count" => Value::Int(10),

        GravitySolver = "gravity.solver" => enum_value(GravityEnum::BarnesHut),
        GravityOpeningAngle = "gravity.opening_angle" => Value::Float(0.5),
        /// Order of the multipole expansion (0 = monopole, 2 = quadrupole).
        GravityMultipoleOrder = "gravity.multipole_order" => Value::Int(2),
        GravityLeafSize = "gravity.leaf_size" => Value::Int(25),
        GravityConstant = "gravity.constant" => Value::Float(6.6743e-11),
        /// Period of gravity re-evaluation; cached accelerations are used
        /// in between. Zero recomputes every step.
        GravityRecomputationPeriod = "gravity.recomputation_period" => Value::Float(0.),

        CollisionHandler = "collision.handler" => enum_value(CollisionHandlerEnum::MergeOrBounce),
        CollisionOverlap = "collision.overlap" => enum_value(OverlapHandlerEnum::Repel),
        CollisionRestitutionNormal = "collision.restitution.normal" => Value::Float(0.5),
        CollisionRestitutionTangent = "collision.restitution.tangent" => Value::Float(1.),
        /// Relative overlap of two spheres tolerated without invoking the
        /// overlap handler.
        CollisionAllowedOverlap = "collision.allowed_overlap" => Value::Float(0.01),
        /// Scale factor of the mutual escape speed in the merge condition.
        CollisionMergingLimit = "collision.merging_limit" => Value::Float(1.),
        NbodyAggregatesEnable = "nbody.aggregates" => Value::Bool(false),
        NbodyAggregatesSource = "nbody.aggregates.source" => enum_value(AggregateEnum::Particles),

        DomainType = "domain.type" => enum_value(DomainEnum::None),
        DomainCenter = "domain.center" => Value::Vector(Vec3::new_zero()),
        DomainRadius = "domain.radius" => Value::Float(1.0e5),
        DomainSize = "domain.size" => Value::Vector(Vec3::new(1.0e5, 1.0e5, 1.0e5)),
        DomainHeight = "domain.height" => Value::Float(1.0e5),

        /// Damping strength of the stabilisation phase.
        StabilizationDamping = "stabilization.damping" => Value::Float(0.1),
    }
);

settings_keys!(
    /// Settings of a single body: material parameters plus numerical
    /// parameters of the SPH method specific for the body.
    BodySettingsId, {
        Eos = "eos" => enum_value(EosEnum::Tillotson),
        /// Adiabatic index of the ideal gas equation of state.
        AdiabaticIndex = "eos.adiabatic_index" => Value::Float(1.4),
        TillotsonSmallA = "eos.tillotson.small_a" => Value::Float(0.5),
        TillotsonSmallB = "eos.tillotson.small_b" => Value::Float(1.5),
        TillotsonAlpha = "eos.tillotson.alpha" => Value::Float(5.),
        TillotsonBeta = "eos.tillotson.beta" => Value::Float(5.),
        /// Coefficient B of the nonlinear compressive term.
        TillotsonNonlinearB = "eos.tillotson.nonlinear_b" => Value::Float(2.67e10),
        /// Initial energy scale of the Tillotson equation.
        TillotsonEnergy = "eos.tillotson.energy" => Value::Float(6.0e6),
        /// Specific energy of incipient vaporization.
        TillotsonEnergyIv = "eos.tillotson.energy_iv" => Value::Float(4.72e6),
        /// Specific energy of complete vaporization.
        TillotsonEnergyCv = "eos.tillotson.energy_cv" => Value::Float(1.82e7),

        /// Density at zero pressure.
        Density = "material.density" => Value::Float(2700.),
        /// Allowed range of density; particle densities are clamped to it.
        DensityRange = "material.density.range" => Value::Interval(Interval::new(10., f64::INFINITY)),
        /// Scale below which density differences are irrelevant; floors the
        /// denominator of the derivative timestep criterion.
        DensityMin = "material.density.min" => Value::Float(50.),
        /// Initial specific internal energy.
        Energy = "material.energy" => Value::Float(0.),
        EnergyRange = "material.energy.range" => Value::Interval(Interval::new(0., f64::INFINITY)),
        EnergyMin = "material.energy.min" => Value::Float(1.),
        /// Initial value of the deviatoric stress tensor.
        StressTensor = "material.stress_tensor" => Value::Traceless(TracelessTensor::null()),
        StressTensorMin = "material.stress_tensor.min" => Value::Float(1.0e5),
        /// Initial damage of the body.
        Damage = "material.damage" => Value::Float(0.),
        DamageRange = "material.damage.range" => Value::Interval(Interval::new(0., 1.)),
        DamageMin = "material.damage.min" => Value::Float(0.03),
        BulkModulus = "material.bulk_modulus" => Value::Float(2.67e10),
        ShearModulus = "material.shear_modulus" => Value::Float(2.27e10),
        /// Von Mises elasticity limit of the material.
        ElasticityLimit = "material.elasticity_limit" => Value::Float(3.5e9),
        /// Speed of crack growth, in units of the local sound speed.
        RayleighSoundSpeed = "material.rayleigh_speed" => Value::Float(0.4),
        WeibullCoefficient = "material.weibull.coefficient" => Value::Float(4.0e23),
        WeibullExponent = "material.weibull.exponent" => Value::Float(9.),

        RheologyYielding = "rheology.yielding" => enum_value(YieldingEnum::VonMises),
        RheologyDamage = "rheology.damage" => enum_value(DamageEnum::None),

        /// Number of SPH particles in the body.
        ParticleCount = "sph.particle_count" => Value::Int(10000),
        InitialDistribution = "sph.initial_distribution" => enum_value(DistributionEnum::Hexagonal),
    }
);

/// Settings relevant for the whole run of the simulation.
pub type RunSettings = Settings<RunSettingsId>;

/// Material and SPH parameters of a single body.
pub type BodySettings = Settings<BodySettingsId>;
