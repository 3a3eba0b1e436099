//! Snapshot writers: resumable binary state files, compact data files,
//! text tables, VTK grids and size-frequency distributions.

use std::fmt::Write as _;
use std::fs;

use bincode::{config, Decode, Encode};
use lin_alg::f64::Vec3;
use plotters::element::PathElement;
use plotters::prelude::{
    BitMapBackend, ChartBuilder, Color, IntoDrawingArea, LineSeries, BLACK, BLUE, WHITE,
};

use crate::error::{Error, Result};
use crate::math::Interval;
use crate::paths::Path;
use crate::quantity::{OrderEnum, QuantityData, QuantityId};
use crate::settings::{
    FlagSet, OutputQuantityEnum, OutputTypeEnum, RunSettings, RunSettingsId, SettingsKey, Value,
};
use crate::stats::{Statistics, StatisticsId};
use crate::storage::Storage;

/// File name mask with `%d` (running snapshot index) and `%e` (quantity
/// name) placeholders. The index stream is monotone and resumable.
#[derive(Clone, Debug)]
pub struct OutputFile {
    directory: Path,
    mask: String,
    index: usize,
}

impl OutputFile {
    pub fn new(directory: Path, mask: &str, first_index: usize) -> Self {
        Self {
            directory,
            mask: mask.to_string(),
            index: first_index,
        }
    }

    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        Ok(Self::new(
            Path::new(&settings.get::<String>(RunSettingsId::RunOutputPath)?),
            &settings.get::<String>(RunSettingsId::RunOutputName)?,
            settings.get::<i64>(RunSettingsId::RunOutputFirstIndex)?.max(0) as usize,
        ))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Expands the mask for the current index and advances the counter.
    pub fn next(&mut self, quantity_name: &str) -> Path {
        let name = self
            .mask
            .replace("%d", &format!("{:04}", self.index))
            .replace("%e", quantity_name);
        self.index += 1;
        self.directory.clone() / Path::new(&name)
    }
}

/// A snapshot writer. Returns the path of the written file.
pub trait Output: Send {
    fn dump(&mut self, storage: &Storage, stats: &Statistics) -> Result<Path>;
}

pub fn create_output(settings: &RunSettings) -> Result<Option<Box<dyn Output>>> {
    let file = OutputFile::from_settings(settings)?;
    match settings.get::<OutputTypeEnum>(RunSettingsId::RunOutputType)? {
        OutputTypeEnum::None => Ok(None),
        OutputTypeEnum::Text => Ok(Some(Box::new(TextOutput {
            file,
            quantities: settings.get_flags(RunSettingsId::RunOutputQuantities)?,
        }))),
        OutputTypeEnum::BinaryState => Ok(Some(Box::new(StateFileOutput {
            file,
            run_settings: settings.clone(),
        }))),
        OutputTypeEnum::CompactData => Ok(Some(Box::new(CompactDataOutput { file }))),
        OutputTypeEnum::Vtk => Ok(Some(Box::new(VtkOutput { file }))),
        OutputTypeEnum::Sfd => Ok(Some(Box::new(SfdOutput { file }))),
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.to_std().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Tab-separated columns, one row per particle; the columns are the
/// enabled output-quantity flags.
pub struct TextOutput {
    file: OutputFile,
    quantities: FlagSet<OutputQuantityEnum>,
}

impl Output for TextOutput {
    fn dump(&mut self, storage: &Storage, stats: &Statistics) -> Result<Path> {
        let path = self.file.next("");
        ensure_directory(&path)?;

        let n = storage.particle_cnt();
        let mut out = String::new();
        let time = stats.get_float(StatisticsId::RunTime).unwrap_or(0.);
        let _ = writeln!(out, "# run time = {:e}", time);

        let mut header = String::from("#");
        let mut columns: Vec<Column<'_>> = Vec::new();
        self.collect_columns(storage, &mut header, &mut columns)?;
        out.push_str(&header);
        out.push('\n');

        for i in 0..n {
            let mut row = String::new();
            for column in &columns {
                column.append(i, &mut row);
            }
            out.push_str(row.trim_end());
            out.push('\n');
        }
        fs::write(path.to_std(), out)?;
        Ok(path)
    }
}

enum Column<'a> {
    Index,
    Scalar(&'a [f64]),
    Vector(&'a [Vec3]),
    Traceless(&'a [crate::math::TracelessTensor]),
}

impl Column<'_> {
    fn append(&self, i: usize, row: &mut String) {
        match self {
            Column::Index => {
                let _ = write!(row, "{}\t", i);
            }
            Column::Scalar(values) => {
                let _ = write!(row, "{:e}\t", values[i]);
            }
            Column::Vector(values) => {
                let v = values[i];
                let _ = write!(row, "{:e}\t{:e}\t{:e}\t", v.x, v.y, v.z);
            }
            Column::Traceless(values) => {
                let t = values[i];
                let _ = write!(
                    row,
                    "{:e}\t{:e}\t{:e}\t{:e}\t{:e}\t",
                    t.xx, t.yy, t.xy, t.xz, t.yz
                );
            }
        }
    }
}

impl TextOutput {
    fn collect_columns<'a>(
        &self,
        storage: &'a Storage,
        header: &mut String,
        columns: &mut Vec<Column<'a>>,
    ) -> Result<()> {
        use OutputQuantityEnum as Q;
        let flags = self.quantities;
        let mut add = |name: &str, column: Column<'a>| {
            let _ = write!(header, " {}", name);
            columns.push(column);
        };
        if flags.has(Q::Index) {
            add("index", Column::Index);
        }
        if flags.has(Q::Position) {
            add("x y z", Column::Vector(storage.value(QuantityId::Position)?));
        }
        if flags.has(Q::Velocity) {
            add(
                "vx vy vz",
                Column::Vector(storage.derivative(QuantityId::Position)?),
            );
        }
        if flags.has(Q::SmoothingLength) {
            add(
                "h",
                Column::Scalar(storage.value(QuantityId::SmoothingLength)?),
            );
        }
        if flags.has(Q::Mass) {
            add("m", Column::Scalar(storage.value(QuantityId::Mass)?));
        }
        if flags.has(Q::Density) && storage.has(QuantityId::Density) {
            add("rho", Column::Scalar(storage.value(QuantityId::Density)?));
        }
        if flags.has(Q::Pressure) && storage.has(QuantityId::Pressure) {
            add("p", Column::Scalar(storage.value(QuantityId::Pressure)?));
        }
        if flags.has(Q::Energy) && storage.has(QuantityId::Energy) {
            add("u", Column::Scalar(storage.value(QuantityId::Energy)?));
        }
        if flags.has(Q::Damage) && storage.has(QuantityId::Damage) {
            add("damage", Column::Scalar(storage.value(QuantityId::Damage)?));
        }
        if flags.has(Q::DeviatoricStress) && storage.has(QuantityId::DeviatoricStress) {
            add(
                "sxx syy sxy sxz syz",
                Column::Traceless(storage.value(QuantityId::DeviatoricStress)?),
            );
        }
        Ok(())
    }
}

/// Everything needed to resume a run: all quantities with their
/// derivatives, material parameters, attractors, the run settings, time
/// and timestep.
#[derive(Encode, Decode)]
pub struct SerializedState {
    pub time: f64,
    pub timestep: f64,
    pub output_index: u64,
    pub run_settings: Vec<(String, String)>,
    pub quantities: Vec<SerializedQuantity>,
    pub materials: Vec<SerializedMaterial>,
    pub attractors: Vec<SerializedAttractor>,
}

#[derive(Encode, Decode)]
pub struct SerializedQuantity {
    pub id: QuantityId,
    pub order: OrderEnum,
    pub data: QuantityData,
    pub range: Interval,
    pub min_value: f64,
}

#[derive(Encode, Decode)]
pub struct SerializedMaterial {
    pub settings: Vec<(String, String)>,
    pub start: u64,
    pub end: u64,
}

#[derive(Encode, Decode)]
pub struct SerializedAttractor {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f64,
    pub radius: f64,
}

/// Losslessly serializes every quantity including derivatives plus
/// material parameters, so that a run can resume from the file.
pub struct StateFileOutput {
    file: OutputFile,
    run_settings: RunSettings,
}

impl Output for StateFileOutput {
    fn dump(&mut self, storage: &Storage, stats: &Statistics) -> Result<Path> {
        let path = self.file.next("");
        ensure_directory(&path)?;
        let state = serialize_state(
            storage,
            &self.run_settings,
            stats.get_float(StatisticsId::RunTime).unwrap_or(0.),
            stats.get_float(StatisticsId::Timestep).unwrap_or(0.),
            self.file.index() as u64,
        )?;
        let bytes = bincode::encode_to_vec(&state, config::standard())
            .map_err(|e| Error::InvalidSetup(e.to_string()))?;
        fs::write(path.to_std(), bytes)?;
        Ok(path)
    }
}

pub fn serialize_state(
    storage: &Storage,
    run_settings: &RunSettings,
    time: f64,
    timestep: f64,
    output_index: u64,
) -> Result<SerializedState> {
    let mut quantities = Vec::new();
    for id in storage.ids() {
        let q = storage.quantity(id)?;
        quantities.push(SerializedQuantity {
            id,
            order: q.order(),
            data: q.data().clone(),
            range: q.range(),
            min_value: q.min_value(),
        });
    }
    let settings_entries = |iter: Vec<(String, Value)>| {
        iter.into_iter()
            .map(|(name, value)| (name, value.write()))
            .collect::<Vec<_>>()
    };
    let materials = storage
        .materials()
        .iter()
        .map(|mat| SerializedMaterial {
            settings: settings_entries(
                mat.settings
                    .iter()
                    .map(|(k, v)| (k.name().to_string(), v))
                    .collect(),
            ),
            start: mat.start as u64,
            end: mat.end as u64,
        })
        .collect();
    let attractors = storage
        .attractors()
        .iter()
        .map(|a| SerializedAttractor {
            position: a.position,
            velocity: a.velocity,
            mass: a.mass,
            radius: a.radius,
        })
        .collect();
    Ok(SerializedState {
        time,
        timestep,
        output_index,
        run_settings: settings_entries(
            run_settings
                .iter()
                .map(|(k, v)| (k.name().to_string(), v))
                .collect(),
        ),
        quantities,
        materials,
        attractors,
    })
}

/// Loads a state file and reconstructs the storage, the run settings and
/// the resume bookkeeping.
pub fn load_state(path: &Path) -> Result<(Storage, RunSettings, SerializedState)> {
    let bytes = fs::read(path.to_std())?;
    let (state, _): (SerializedState, usize) =
        bincode::decode_from_slice(&bytes, config::standard()).map_err(|e| Error::ConfigParse {
            line: format!("{} ({})", path, e),
        })?;

    let mut settings = RunSettings::new();
    apply_entries::<crate::settings::RunSettingsId>(&mut settings, &state.run_settings)?;

    let mut storage = Storage::new();
    for q in &state.quantities {
        let quantity = reconstruct_quantity(q);
        storage.insert_serialized(q.id, quantity);
    }
    let mut materials = Vec::new();
    for mat in &state.materials {
        let mut body = crate::settings::BodySettings::new();
        apply_entries::<crate::settings::BodySettingsId>(&mut body, &mat.settings)?;
        materials.push(crate::storage::MaterialPartition {
            settings: body,
            start: mat.start as usize,
            end: mat.end as usize,
        });
    }
    storage.set_materials(materials);
    for a in &state.attractors {
        storage.add_attractor(a.position, a.velocity, a.mass, a.radius);
    }
    Ok((storage, settings, state))
}

fn apply_entries<K: SettingsKey>(
    settings: &mut crate::settings::Settings<K>,
    entries: &[(String, String)],
) -> Result<()> {
    for (name, text) in entries {
        let Some(key) = K::from_name(name) else {
            return Err(Error::UnknownKey(name.clone()));
        };
        let value = key
            .default_value()
            .parse_as(text)
            .ok_or_else(|| Error::InvalidValue {
                key: name.clone(),
                value: text.clone(),
            })?;
        settings.set_raw(key, value);
    }
    Ok(())
}

fn reconstruct_quantity(q: &SerializedQuantity) -> crate::quantity::Quantity {
    crate::quantity::Quantity::from_parts(q.order, q.data.clone(), q.range, q.min_value)
}

/// Compact binary containing only the curated subset of quantities used
/// by the analysis tools.
pub struct CompactDataOutput {
    file: OutputFile,
}

#[derive(Encode, Decode)]
struct CompactData {
    time: f64,
    position: Vec<Vec3>,
    velocity: Vec<Vec3>,
    smoothing_length: Vec<f64>,
    mass: Vec<f64>,
    density: Vec<f64>,
    energy: Vec<f64>,
}

impl Output for CompactDataOutput {
    fn dump(&mut self, storage: &Storage, stats: &Statistics) -> Result<Path> {
        let path = self.file.next("");
        ensure_directory(&path)?;
        let n = storage.particle_cnt();
        let data = CompactData {
            time: stats.get_float(StatisticsId::RunTime).unwrap_or(0.),
            position: storage.value::<Vec3>(QuantityId::Position)?.to_vec(),
            velocity: storage.derivative::<Vec3>(QuantityId::Position)?.to_vec(),
            smoothing_length: storage.value::<f64>(QuantityId::SmoothingLength)?.to_vec(),
            mass: storage.value::<f64>(QuantityId::Mass)?.to_vec(),
            density: if storage.has(QuantityId::Density) {
                storage.value::<f64>(QuantityId::Density)?.to_vec()
            } else {
                vec![0.; n]
            },
            energy: if storage.has(QuantityId::Energy) {
                storage.value::<f64>(QuantityId::Energy)?.to_vec()
            } else {
                vec![0.; n]
            },
        };
        let bytes = bincode::encode_to_vec(&data, config::standard())
            .map_err(|e| Error::InvalidSetup(e.to_string()))?;
        fs::write(path.to_std(), bytes)?;
        Ok(path)
    }
}

/// Legacy VTK unstructured grid for external visualisation.
pub struct VtkOutput {
    file: OutputFile,
}

impl Output for VtkOutput {
    fn dump(&mut self, storage: &Storage, _stats: &Statistics) -> Result<Path> {
        let path = self.file.next("");
        ensure_directory(&path)?;
        let r = storage.value::<Vec3>(QuantityId::Position)?;
        let v = storage.derivative::<Vec3>(QuantityId::Position)?;
        let m = storage.value::<f64>(QuantityId::Mass)?;
        let n = r.len();

        let mut out = String::new();
        out.push_str("# vtk DataFile Version 2.0\n");
        out.push_str("particle snapshot\n");
        out.push_str("ASCII\n");
        out.push_str("DATASET UNSTRUCTURED_GRID\n");
        let _ = writeln!(out, "POINTS {} double", n);
        for p in r {
            let _ = writeln!(out, "{:e} {:e} {:e}", p.x, p.y, p.z);
        }
        let _ = writeln!(out, "CELLS {} {}", n, 2 * n);
        for i in 0..n {
            let _ = writeln!(out, "1 {}", i);
        }
        let _ = writeln!(out, "CELL_TYPES {}", n);
        for _ in 0..n {
            out.push_str("1\n");
        }
        let _ = writeln!(out, "POINT_DATA {}", n);
        out.push_str("SCALARS mass double 1\nLOOKUP_TABLE default\n");
        for mass in m {
            let _ = writeln!(out, "{:e}", mass);
        }
        out.push_str("VECTORS velocity double\n");
        for vel in v {
            let _ = writeln!(out, "{:e} {:e} {:e}", vel.x, vel.y, vel.z);
        }
        if let Ok(rho) = storage.value::<f64>(QuantityId::Density) {
            out.push_str("SCALARS density double 1\nLOOKUP_TABLE default\n");
            for value in rho {
                let _ = writeln!(out, "{:e}", value);
            }
        }
        fs::write(path.to_std(), out)?;
        Ok(path)
    }
}

/// Cumulative size-frequency distribution of the fragments: a text table
/// plus a log-log plot.
pub struct SfdOutput {
    file: OutputFile,
}

impl Output for SfdOutput {
    fn dump(&mut self, storage: &Storage, _stats: &Statistics) -> Result<Path> {
        let path = self.file.next("sfd");
        ensure_directory(&path)?;
        let h = storage.value::<f64>(QuantityId::SmoothingLength)?;
        let mut radii: Vec<f64> = h.to_vec();
        radii.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        // N(>R): cumulative count of fragments larger than R
        let mut out = String::from("# R\tN(>R)\n");
        let mut curve = Vec::with_capacity(radii.len());
        for (count, radius) in radii.iter().enumerate() {
            let _ = writeln!(out, "{:e}\t{}", radius, count + 1);
            curve.push((radius.log10(), ((count + 1) as f64).log10()));
        }
        fs::write(path.to_std(), out)?;

        let plot_path = path.replace_extension("png");
        if let Err(e) = plot_sfd(&curve, plot_path.native()) {
            // the table is the primary output, the plot is best-effort
            eprintln!("Error plotting SFD: {e}");
        }
        Ok(path)
    }
}

/// Draws the cumulative distribution with log-log axes.
fn plot_sfd(data: &[(f64, f64)], filename: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
    if data.is_empty() {
        return Ok(());
    }
    let x_range = data
        .iter()
        .map(|(x, _)| *x)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), x| {
            (min.min(x), max.max(x))
        });
    let y_range = data
        .iter()
        .map(|(_, y)| *y)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), y| {
            (min.min(y), max.max(y))
        });

    let root = BitMapBackend::new(filename, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cumulative size-frequency distribution", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(x_range.0..x_range.1.max(x_range.0 + 1e-6), y_range.0..y_range.1.max(y_range.0 + 1e-6))?;

    chart
        .configure_mesh()
        .x_desc("log R")
        .y_desc("log N(>R)")
        .draw()?;

    chart
        .draw_series(LineSeries::new(data.iter().cloned(), BLUE))?
        .label("fragments")
        .legend(|(x, y)| PathElement::new([(x, y), (x + 20, y)], BLUE));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}
