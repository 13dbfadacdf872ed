//! Workbook loader for the urbs tables and the supply-chain extension tables.
//!
//! Headers are matched after normalisation: trimmed, lower-cased, with spaces and
//! underscores read as `-`. Numeric cells may be stored as text and may use a decimal
//! comma or contain spaces.
//!
//! Wide sheets encode index dimensions in their column names:
//! * `cost_sheet`: `Stf` plus `<costtype>_<location>_<technology>` columns. Columns with
//!   fewer than three `_`-separated parts are skipped. The technology is every part after
//!   the location, joined with `_`.
//! * `instalable_capacity`, `dcr`, `stocklvl`, `milestones`: `Stf` plus
//!   `<location>_<technology>` columns. Columns with fewer than two parts are skipped.
//! * `Demand`, `SupIm`: `support_timeframe`, `t` plus `<site>.<commodity>` columns.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, bail};
use calamine::{Data, DataType, Range, Reader, Sheets, open_workbook_auto};
use indexmap::IndexMap;
use log::{debug, warn};

use crate::model::tables::{
    CommodityAttrs, CommodityType, ExtConfig, ExtKey, ExtTables, LearningCurve, ModelInput,
    ProcessAttrs, TechnologyParams, Timestep, UrbsTables, Year,
};

type Workbook = Sheets<BufReader<File>>;

/// Rows of one sheet below a normalised header row
#[derive(Debug, Clone, Default)]
pub struct SheetTable {
    name: String,
    headers: Vec<String>,
    columns: IndexMap<String, usize>,
    rows: Vec<Vec<Data>>,
}

fn normalise(header: &str) -> String {
    header.trim().to_lowercase().replace([' ', '_'], "-")
}

/// Reads a number from a cell, accepting text with a decimal comma or spaces
pub fn parse_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(value) => Some(*value),
        Data::Int(value) => Some(*value as f64),
        Data::String(text) => {
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.replace(',', ".").parse().ok()
        }
        _ => None,
    }
}

fn parse_year(cell: &Data) -> Option<Year> {
    parse_number(cell).map(|value| value.round() as Year)
}

fn parse_text(cell: &Data) -> Option<String> {
    cell.as_string()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

impl SheetTable {
    pub fn from_range(name: &str, range: &Range<Data>) -> Self {
        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .map(|row| row.iter().map(|cell| parse_text(cell).unwrap_or_default()).collect())
            .unwrap_or_default();
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (normalise(header), i))
            .collect();
        let rows = rows
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .map(<[Data]>::to_vec)
            .collect();
        Self {
            name: name.to_string(),
            headers,
            columns,
            rows,
        }
    }

    fn column(&self, header: &str) -> Option<usize> {
        self.columns.get(&normalise(header)).copied()
    }

    fn require(&self, header: &str) -> Result<usize> {
        self.column(header)
            .with_context(|| format!("Sheet '{}' has no column '{header}'", self.name))
    }

    fn cell<'a>(&self, row: &'a [Data], column: usize) -> &'a Data {
        row.get(column).unwrap_or(&Data::Empty)
    }

    fn number(&self, row: &[Data], column: Option<usize>) -> Option<f64> {
        column.and_then(|c| parse_number(self.cell(row, c)))
    }

    fn text(&self, row_index: usize, row: &[Data], column: usize) -> Result<String> {
        parse_text(self.cell(row, column)).with_context(|| {
            format!(
                "Sheet '{}', row {}: empty '{}'",
                self.name,
                row_index + 2,
                self.headers[column]
            )
        })
    }

    fn year(&self, row_index: usize, row: &[Data], column: usize) -> Result<Year> {
        parse_year(self.cell(row, column)).with_context(|| {
            format!(
                "Sheet '{}', row {}: '{}' is not a year",
                self.name,
                row_index + 2,
                self.headers[column]
            )
        })
    }

    /// Columns other than `skip`, with their raw header text
    fn data_columns<'a>(&'a self, skip: &'a [usize]) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        self.headers
            .iter()
            .enumerate()
            .filter(move |(i, header)| !skip.contains(i) && !header.is_empty())
            .map(|(i, header)| (i, header.as_str()))
    }
}

/// Loads both workbooks into one model input with default extension settings
pub fn load_input(urbs_workbook: &Path, ext_workbook: &Path) -> Result<ModelInput> {
    let urbs = read_urbs_workbook(urbs_workbook)
        .with_context(|| format!("Could not load {}", urbs_workbook.display()))?;
    let (ext, ext_config) = read_ext_workbook(ext_workbook)
        .with_context(|| format!("Could not load {}", ext_workbook.display()))?;
    Ok(ModelInput {
        urbs,
        ext,
        ext_config,
        ..Default::default()
    })
}

fn open(path: &Path) -> Result<Workbook> {
    open_workbook_auto(path).with_context(|| format!("Could not open workbook {}", path.display()))
}

/// A sheet of the workbook, or `None` if the workbook does not have it
fn read_sheet(workbook: &mut Workbook, name: &str) -> Result<Option<SheetTable>> {
    if !workbook.sheet_names().iter().any(|sheet| sheet == name) {
        debug!("Sheet '{name}' not present, using an empty table");
        return Ok(None);
    }
    let range = workbook
        .worksheet_range(name)
        .with_context(|| format!("Could not read sheet '{name}'"))?;
    Ok(Some(SheetTable::from_range(name, &range)))
}

pub fn read_urbs_workbook(path: &Path) -> Result<UrbsTables> {
    let mut workbook = open(path)?;
    let mut tables = UrbsTables::default();
    if let Some(sheet) = read_sheet(&mut workbook, "Global")? {
        tables.global_prop = read_global(&sheet)?;
    }
    if let Some(sheet) = read_sheet(&mut workbook, "Site")? {
        tables.site_area = read_sites(&sheet)?;
    }
    if let Some(sheet) = read_sheet(&mut workbook, "Commodity")? {
        tables.commodity = read_commodities(&sheet)?;
    }
    if let Some(sheet) = read_sheet(&mut workbook, "Process")? {
        tables.process = read_processes(&sheet)?;
    }
    if let Some(sheet) = read_sheet(&mut workbook, "Process-Commodity")? {
        read_process_commodity(&sheet, &mut tables)?;
    }
    if let Some(sheet) = read_sheet(&mut workbook, "Demand")? {
        tables.demand = read_series(&sheet)?;
    }
    if let Some(sheet) = read_sheet(&mut workbook, "SupIm")? {
        tables.supim = read_series(&sheet)?;
    }
    Ok(tables)
}

pub fn read_ext_workbook(path: &Path) -> Result<(ExtTables, ExtConfig)> {
    let mut workbook = open(path)?;
    let mut tables = ExtTables::default();
    let mut config = ExtConfig::default();
    let mut defaults = TechnologyParams::default();

    if let Some(sheet) = read_sheet(&mut workbook, "Params")? {
        defaults = read_params(&sheet, &mut config)?;
    }
    if let Some(sheet) = read_sheet(&mut workbook, "cost_sheet")? {
        read_cost_sheet(&sheet, &mut tables)?;
    }
    let yearly = [
        ("instalable_capacity", &mut tables.installable_capacity),
        ("dcr", &mut tables.dcr),
        ("stocklvl", &mut tables.stock_level),
        ("milestones", &mut tables.milestones),
    ];
    for (name, table) in yearly {
        if let Some(sheet) = read_sheet(&mut workbook, name)? {
            *table = read_yearly_sheet(&sheet)?;
        }
    }
    match read_sheet(&mut workbook, "technologies")? {
        Some(sheet) => tables.technologies = read_technologies(&sheet, &defaults)?,
        None => {
            // every technology named in the cost tables gets the Params scalars
            for (_, location, tech) in tables.import_cost.keys() {
                tables
                    .technologies
                    .entry((location.clone(), tech.clone()))
                    .or_insert_with(|| defaults.clone());
            }
        }
    }
    if let Some(sheet) = read_sheet(&mut workbook, "learning_curve")? {
        tables.learning_curves = read_learning_curves(&sheet)?;
    }
    Ok((tables, config))
}

fn set_technology_param(tech: &mut TechnologyParams, name: &str, value: f64) -> bool {
    match name {
        "InitialCapacity" => tech.installed_capacity = value,
        "Existing Stock in y0" => tech.existing_stock = value,
        "Storagecost / MW" => tech.storage_cost = value,
        "FT" => tech.turnover_factor = value,
        "anti dumping Index" | "anti duping Index" => tech.anti_dumping_index = value,
        "dQ EU Primary" => tech.dq_primary = value,
        "dQ EU Secondary" => tech.dq_secondary = value,
        "IR EU Primary" => tech.ir_primary = value,
        "IR EU Secondary" => tech.ir_secondary = value,
        "DR Primary" => tech.dr_primary = value,
        "DR Secondary" => tech.dr_secondary = value,
        "DCR Solar" | "DCR" => tech.dcr = value,
        "lf Solar" | "lf" => tech.load_factor = value,
        "hours per year" => tech.hours_per_year = value,
        "n turnover stockpile" | "n" => tech.turnover_window = value.round() as u32,
        "l" => tech.content_lag = value.round() as i32,
        _ => return false,
    }
    true
}

fn set_config_param(config: &mut ExtConfig, name: &str, value: f64) -> bool {
    match name {
        "Start Year y0" => config.start_year = value.round() as Year,
        "End Year yn" => config.end_year = value.round() as Year,
        "logistic cost" => config.logistic_cost = value,
        "gamma" => config.gamma = value,
        "turnover offset" => config.turnover_offset = value.round() as i32,
        "learning steps" => config.learning_steps = value.round() as usize,
        _ => return false,
    }
    true
}

/// `Param`/`Value` sheet: global scalars go to `config`, the rest are the technology
/// defaults
pub fn read_params(sheet: &SheetTable, config: &mut ExtConfig) -> Result<TechnologyParams> {
    let param = sheet.require("Param")?;
    let value = sheet.require("Value")?;
    let mut defaults = TechnologyParams::default();
    for (i, row) in sheet.rows.iter().enumerate() {
        let name = sheet.text(i, row, param)?;
        let Some(number) = sheet.number(row, Some(value)) else {
            bail!("Parameter '{name}' has no numeric value");
        };
        if !set_config_param(config, &name, number) && !set_technology_param(&mut defaults, &name, number) {
            warn!("Unknown parameter '{name}' in sheet '{}'", sheet.name);
        }
    }
    Ok(defaults)
}

/// Splits `location_technology` column names; `None` for fewer than two parts
fn split_location_technology(name: &str) -> Option<(String, String)> {
    let (location, tech) = name.split_once('_')?;
    if location.is_empty() || tech.is_empty() {
        return None;
    }
    Some((location.to_string(), tech.to_string()))
}

pub fn read_cost_sheet(sheet: &SheetTable, tables: &mut ExtTables) -> Result<()> {
    let stf = sheet.require("Stf")?;
    for (column, header) in sheet.data_columns(&[stf]) {
        let parts: Vec<&str> = header.split('_').collect();
        if parts.len() < 3 {
            debug!("Skipping cost column '{header}'");
            continue;
        }
        let location = parts[1].to_string();
        let tech = parts[2..].join("_");
        let table = match parts[0] {
            "import" => &mut tables.import_cost,
            "manufacturing" => &mut tables.manufacturing_cost,
            "remanufacturing" => &mut tables.remanufacturing_cost,
            other => {
                warn!("Unknown cost type '{other}' in column '{header}'");
                continue;
            }
        };
        for (i, row) in sheet.rows.iter().enumerate() {
            let year = sheet.year(i, row, stf)?;
            if let Some(value) = sheet.number(row, Some(column)) {
                table.insert((year, location.clone(), tech.clone()), value);
            }
        }
    }
    Ok(())
}

pub fn read_yearly_sheet(sheet: &SheetTable) -> Result<IndexMap<ExtKey, f64>> {
    let stf = sheet.require("Stf")?;
    let mut table = IndexMap::new();
    for (column, header) in sheet.data_columns(&[stf]) {
        let Some((location, tech)) = split_location_technology(header) else {
            debug!("Skipping column '{header}' of sheet '{}'", sheet.name);
            continue;
        };
        for (i, row) in sheet.rows.iter().enumerate() {
            let year = sheet.year(i, row, stf)?;
            if let Some(value) = sheet.number(row, Some(column)) {
                table.insert((year, location.clone(), tech.clone()), value);
            }
        }
    }
    Ok(table)
}

/// One row per location and technology; missing cells keep the `defaults`
pub fn read_technologies(
    sheet: &SheetTable,
    defaults: &TechnologyParams,
) -> Result<IndexMap<(String, String), TechnologyParams>> {
    let location = sheet.require("location")?;
    let technology = sheet.require("technology")?;
    let mut technologies = IndexMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        let mut params = defaults.clone();
        for (column, header) in sheet.data_columns(&[location, technology]) {
            if let Some(value) = sheet.number(row, Some(column)) {
                if !set_technology_param(&mut params, header.trim(), value) {
                    warn!("Unknown technology column '{header}'");
                }
            }
        }
        technologies.insert(
            (sheet.text(i, row, location)?, sheet.text(i, row, technology)?),
            params,
        );
    }
    Ok(technologies)
}

pub fn read_learning_curves(sheet: &SheetTable) -> Result<IndexMap<String, LearningCurve>> {
    let technology = sheet.require("technology")?;
    let step = sheet.require("n")?;
    let reduction = sheet.column("P");
    let threshold = sheet.column("Q");
    let mut curves: IndexMap<String, LearningCurve> = IndexMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        let tech = sheet.text(i, row, technology)?;
        let Some(n) = sheet.number(row, Some(step)).filter(|n| *n >= 0.0) else {
            bail!("Sheet '{}', row {}: invalid segment index", sheet.name, i + 2);
        };
        let n = n.round() as usize;
        let curve = curves.entry(tech).or_default();
        if curve.price_reduction.len() <= n {
            curve.price_reduction.resize(n + 1, 0.0);
            curve.capacity_threshold.resize(n + 1, 0.0);
        }
        curve.price_reduction[n] = sheet.number(row, reduction).unwrap_or(0.0);
        curve.capacity_threshold[n] = sheet.number(row, threshold).unwrap_or(0.0);
    }
    Ok(curves)
}

pub fn read_global(sheet: &SheetTable) -> Result<IndexMap<(Year, String), f64>> {
    let stf = sheet.require("support_timeframe")?;
    let property = sheet.require("Property")?;
    let value = sheet.require("value")?;
    let mut table = IndexMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        if let Some(number) = sheet.number(row, Some(value)) {
            table.insert((sheet.year(i, row, stf)?, sheet.text(i, row, property)?), number);
        }
    }
    Ok(table)
}

pub fn read_sites(sheet: &SheetTable) -> Result<IndexMap<(Year, String), f64>> {
    let stf = sheet.require("support_timeframe")?;
    let name = sheet.require("Name")?;
    let area = sheet.column("area");
    let mut table = IndexMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        let value = sheet.number(row, area).unwrap_or(f64::INFINITY);
        table.insert((sheet.year(i, row, stf)?, sheet.text(i, row, name)?), value);
    }
    Ok(table)
}

pub fn read_commodities(
    sheet: &SheetTable,
) -> Result<IndexMap<(Year, String, String, CommodityType), CommodityAttrs>> {
    let stf = sheet.require("support_timeframe")?;
    let site = sheet.require("Site")?;
    let commodity = sheet.require("Commodity")?;
    let com_type = sheet.require("Type")?;
    let [price, max, max_per_hour, cost_factor] =
        ["price", "max", "maxperhour", "cost_factor"].map(|c| sheet.column(c));
    let mut table = IndexMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        let defaults = CommodityAttrs::default();
        let kind: CommodityType = sheet
            .text(i, row, com_type)?
            .parse()
            .with_context(|| format!("Sheet '{}', row {}", sheet.name, i + 2))?;
        table.insert(
            (
                sheet.year(i, row, stf)?,
                sheet.text(i, row, site)?,
                sheet.text(i, row, commodity)?,
                kind,
            ),
            CommodityAttrs {
                price: sheet.number(row, price).unwrap_or(defaults.price),
                max: sheet.number(row, max).unwrap_or(defaults.max),
                max_per_hour: sheet.number(row, max_per_hour).unwrap_or(defaults.max_per_hour),
                cost_factor: sheet.number(row, cost_factor).unwrap_or(defaults.cost_factor),
            },
        );
    }
    Ok(table)
}

pub fn read_processes(sheet: &SheetTable) -> Result<IndexMap<(Year, String, String), ProcessAttrs>> {
    let stf = sheet.require("support_timeframe")?;
    let site = sheet.require("Site")?;
    let process = sheet.require("Process")?;
    let lifetime = sheet.column("lifetime").or_else(|| sheet.column("depreciation"));
    let mut table = IndexMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        let d = ProcessAttrs::default();
        let get = |header: &str, default: f64| sheet.number(row, sheet.column(header)).unwrap_or(default);
        let attrs = ProcessAttrs {
            inst_cap: get("inst-cap", d.inst_cap),
            cap_lo: get("cap-lo", d.cap_lo),
            cap_up: get("cap-up", d.cap_up),
            max_grad: get("max-grad", d.max_grad),
            min_fraction: get("min-fraction", d.min_fraction),
            inv_cost: get("inv-cost", d.inv_cost),
            fix_cost: get("fix-cost", d.fix_cost),
            var_cost: get("var-cost", d.var_cost),
            invcost_factor: get("invcost-factor", d.invcost_factor),
            overpay_factor: get("overpay-factor", d.overpay_factor),
            cost_factor: get("cost_factor", d.cost_factor),
            area_per_cap: sheet.number(row, sheet.column("area-per-cap")),
            lifetime: sheet.number(row, lifetime).unwrap_or(d.lifetime),
        };
        table.insert(
            (
                sheet.year(i, row, stf)?,
                sheet.text(i, row, site)?,
                sheet.text(i, row, process)?,
            ),
            attrs,
        );
    }
    Ok(table)
}

/// `Direction` In/Out rows into the input and output ratio tables
pub fn read_process_commodity(sheet: &SheetTable, tables: &mut UrbsTables) -> Result<()> {
    let stf = sheet.require("support_timeframe")?;
    let process = sheet.require("Process")?;
    let commodity = sheet.require("Commodity")?;
    let direction = sheet.require("Direction")?;
    let ratio = sheet.require("ratio")?;
    let ratio_min = sheet.column("ratio-min");
    for (i, row) in sheet.rows.iter().enumerate() {
        let key = (
            sheet.year(i, row, stf)?,
            sheet.text(i, row, process)?,
            sheet.text(i, row, commodity)?,
        );
        let value = sheet.number(row, Some(ratio)).unwrap_or(0.0);
        let minimum = sheet.number(row, ratio_min);
        let (ratios, min_ratios) = match sheet.text(i, row, direction)?.as_str() {
            "In" => (&mut tables.r_in, &mut tables.r_in_min_fraction),
            "Out" => (&mut tables.r_out, &mut tables.r_out_min_fraction),
            other => bail!(
                "Sheet '{}', row {}: direction '{other}' is neither In nor Out",
                sheet.name,
                i + 2
            ),
        };
        if let Some(minimum) = minimum {
            min_ratios.insert(key.clone(), minimum);
        }
        ratios.insert(key, value);
    }
    Ok(())
}

/// Wide time series with `<site>.<commodity>` columns
pub fn read_series(sheet: &SheetTable) -> Result<IndexMap<(Year, String, String, Timestep), f64>> {
    let stf = sheet.require("support_timeframe")?;
    let t = sheet.require("t")?;
    let mut table = IndexMap::new();
    for (column, header) in sheet.data_columns(&[stf, t]) {
        let Some((site, commodity)) = header.split_once('.') else {
            debug!("Skipping column '{header}' of sheet '{}'", sheet.name);
            continue;
        };
        for (i, row) in sheet.rows.iter().enumerate() {
            let Some(step) = sheet.number(row, Some(t)).filter(|step| *step >= 0.0) else {
                bail!("Sheet '{}', row {}: invalid timestep", sheet.name, i + 2);
            };
            if let Some(value) = sheet.number(row, Some(column)) {
                table.insert(
                    (
                        sheet.year(i, row, stf)?,
                        site.trim().to_string(),
                        commodity.trim().to_string(),
                        step.round() as Timestep,
                    ),
                    value,
                );
            }
        }
    }
    Ok(table)
}
