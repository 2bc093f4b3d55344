//! Parser for one device profiler log.
//!
//! Layout: a preamble line (`ARCH: <arch>, CHIP_FREQ[MHz]: <mhz>, ...`), a
//! header line, then one record per timer event with positional columns
//! `pcie, core_x, core_y, risc, timer_id, time, data, run_host_id, zone, type, ...`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::TargetId;
use crate::counter::PublicationCheck;
use crate::types::{CoreId, CounterReading, Variant, WaitObservation, WaitObservations, WaitSite};

const COL_PCIE: usize = 0;
const COL_CORE_X: usize = 1;
const COL_CORE_Y: usize = 2;
const COL_RISC: usize = 3;
const COL_TIME: usize = 5;
const COL_DATA: usize = 6;
const COL_HOST_ID: usize = 7;
const COL_ZONE: usize = 8;
const COL_TYPE: usize = 9;

/// Columns a record must carry.
pub const MIN_COLUMNS: usize = COL_TYPE + 1;

const COMPUTE_THREAD_TAG: &str = "TRISC";
const ZONE_START: &str = "ZONE_START";
const ZONE_END: &str = "ZONE_END";

/// Why a log, a row, or one kernel record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MalformedLog {
    /// The file could not be read.
    #[error("unreadable log: {message}")]
    Unreadable {
        /// Underlying error text.
        message: String,
    },
    /// No column header found.
    #[error("missing column header")]
    MissingHeader,
    /// A record has fewer columns than required.
    #[error("line {line}: {found} columns, expected at least {MIN_COLUMNS}")]
    TooFewColumns {
        /// 1-based line number.
        line: u64,
        /// Columns present.
        found: usize,
    },
    /// A numeric field did not parse.
    #[error("line {line}: column {column} has unparseable value '{value}'")]
    BadField {
        /// 1-based line number.
        line: u64,
        /// Column name.
        column: String,
        /// Raw text.
        value: String,
    },
    /// A compute thread lacks a kernel zone marker.
    #[error("core {core} host {host_id} thread {thread}: missing {marker}")]
    MissingZoneMarker {
        /// Core of the kernel.
        core: CoreId,
        /// Host program id.
        host_id: u64,
        /// RISC thread name.
        thread: String,
        /// Marker type.
        marker: String,
    },
    /// A compute thread has more than one marker of one type.
    #[error("core {core} host {host_id} thread {thread}: {count} {marker} markers")]
    DuplicateZoneMarker {
        /// Core of the kernel.
        core: CoreId,
        /// Host program id.
        host_id: u64,
        /// RISC thread name.
        thread: String,
        /// Marker type.
        marker: String,
        /// Markers present.
        count: usize,
    },
    /// The kernel zone ends before it starts.
    #[error("core {core} host {host_id}: kernel end {end} precedes start {start}")]
    EndBeforeStart {
        /// Core of the kernel.
        core: CoreId,
        /// Host program id.
        host_id: u64,
        /// Start cycle.
        start: u64,
        /// End cycle.
        end: u64,
    },
    /// More than one thread publishes the same wait site.
    #[error("core {core} host {host_id}: wait site {site} reported by {threads} threads")]
    AmbiguousWaitSite {
        /// Core of the kernel.
        core: CoreId,
        /// Host program id.
        host_id: u64,
        /// Wait site.
        site: WaitSite,
        /// Threads reporting it.
        threads: usize,
    },
    /// A counter value does not fit the counter width.
    #[error("core {core} host {host_id}: {site} value {value} exceeds 32-bit counter")]
    CounterOutOfRange {
        /// Core of the kernel.
        core: CoreId,
        /// Host program id.
        host_id: u64,
        /// Wait site.
        site: WaitSite,
        /// Raw value.
        value: u64,
    },
}

impl MalformedLog {
    /// Whether the whole file was rejected rather than one row or kernel.
    pub fn is_file_level(&self) -> bool {
        matches!(self, MalformedLog::Unreadable { .. } | MalformedLog::MissingHeader)
    }
}

/// Device information from the preamble line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Architecture name, lowercased.
    pub arch: Option<String>,
    /// Core clock in MHz.
    pub chip_freq_mhz: Option<f64>,
}

impl DeviceInfo {
    /// Calibration target of this device.
    pub fn target(&self) -> Option<TargetId> {
        self.arch.as_deref().map(TargetId::new)
    }

    /// Convert device cycles to nanoseconds.
    pub fn cycles_to_ns(&self, cycles: f64) -> Option<f64> {
        self.chip_freq_mhz.filter(|f| *f > 0.0).map(|mhz| cycles * 1_000.0 / mhz)
    }

    fn parse(fields: &csv::StringRecord) -> Self {
        let mut info = DeviceInfo::default();
        for field in fields.iter() {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            if key == "ARCH" && !value.is_empty() {
                info.arch = Some(value.to_ascii_lowercase());
            } else if key.starts_with("CHIP_FREQ") {
                info.chip_freq_mhz = value.parse().ok();
            }
        }
        info
    }
}

/// One kernel invocation on one core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelRecord {
    /// Core coordinate.
    pub core: CoreId,
    /// Host program id.
    pub host_id: u64,
    /// Latest kernel end minus earliest kernel start across compute threads.
    pub kernel_length_cycles: u64,
    /// Wait-site observations.
    pub wait: WaitObservations,
}

/// Everything recovered from one log.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    /// Preamble contents.
    pub device: DeviceInfo,
    /// Kernel records in (core, host id) order.
    pub kernels: Vec<KernelRecord>,
    /// Rows and kernels that were rejected.
    pub issues: Vec<MalformedLog>,
}

/// Parser settings.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Kernel zone name.
    pub kernel_zone: String,
    /// Variant the log belongs to; decides how wait-site data is read.
    pub variant: Variant,
    /// Counter values above this are flagged.
    pub expected_max_iterations: u32,
}

#[derive(Default)]
struct ThreadMarkers {
    starts: Vec<u64>,
    ends: Vec<u64>,
}

#[derive(Default)]
struct GroupRows {
    kernel: BTreeMap<String, ThreadMarkers>,
    // (site, thread) -> (time, data) in file order
    waits: BTreeMap<(WaitSite, String), Vec<(u64, u64)>>,
    // First rejected kernel-zone row; the whole record is dropped.
    kernel_failure: Option<MalformedLog>,
    // First rejected row per wait site; only that site is dropped.
    site_failures: BTreeMap<WaitSite, MalformedLog>,
}

impl GroupRows {
    fn fail_kernel(&mut self, issue: MalformedLog) {
        self.kernel_failure.get_or_insert(issue);
    }

    fn fail_site(&mut self, site: WaitSite, issue: MalformedLog) {
        self.site_failures.entry(site).or_insert(issue);
    }
}

/// Parse one device log.
///
/// Returns `Err` only when the file as a whole is unusable. Rejected rows and
/// kernels are listed in [`ParsedLog::issues`] and the rest is kept. A kernel
/// record yields at most one issue. Bytes that are not UTF-8 only matter when
/// they land in a column the parser reads.
pub fn parse_device_log<R: Read>(reader: R, options: &ParseOptions) -> Result<ParsedLog, MalformedLog> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut parsed = ParsedLog::default();
    let mut groups: BTreeMap<(CoreId, u64), GroupRows> = BTreeMap::new();
    let mut header_seen = false;
    let mut raw = csv::ByteRecord::new();

    loop {
        match csv_reader.read_byte_record(&mut raw) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                return Err(MalformedLog::Unreadable { message: e.to_string() });
            }
        }
        let line = raw.position().map(|p| p.line()).unwrap_or(0);
        let record = csv::StringRecord::from_byte_record_lossy(raw.clone());

        if !header_seen {
            if is_header(&record) {
                header_seen = true;
            } else if parsed.device == DeviceInfo::default() {
                parsed.device = DeviceInfo::parse(&record);
            }
            continue;
        }

        if record.len() < MIN_COLUMNS {
            parsed.issues.push(MalformedLog::TooFewColumns { line, found: record.len() });
            continue;
        }
        let risc = &record[COL_RISC];
        if !risc.contains(COMPUTE_THREAD_TAG) {
            continue;
        }
        let zone = &record[COL_ZONE];
        let site = WaitSite::ALL.into_iter().find(|s| s.zone_name() == zone);
        if zone != options.kernel_zone && site.is_none() {
            continue;
        }

        let key = match parse_key(&record, line) {
            Ok(key) => key,
            Err(issue) => {
                parsed.issues.push(issue);
                continue;
            }
        };
        let group = groups.entry(key).or_default();
        let row = match parse_values(&record, line) {
            Ok(row) => row,
            Err(issue) => {
                match site {
                    Some(site) if zone != options.kernel_zone => group.fail_site(site, issue),
                    _ => group.fail_kernel(issue),
                }
                continue;
            }
        };
        if zone == options.kernel_zone {
            let markers = group.kernel.entry(risc.to_string()).or_default();
            match &record[COL_TYPE] {
                ZONE_START => markers.starts.push(row.time),
                ZONE_END => markers.ends.push(row.time),
                _ => {}
            }
        } else if let Some(site) = site {
            group.waits.entry((site, risc.to_string())).or_default().push((row.time, row.data));
        }
    }

    if !header_seen {
        return Err(MalformedLog::MissingHeader);
    }

    for ((core, host_id), mut rows) in groups {
        if let Some(issue) = rows.kernel_failure {
            parsed.issues.push(issue);
            continue;
        }
        // Cores that never ran a kernel zone are data-movement or idle cores.
        if rows.kernel.is_empty() {
            continue;
        }
        match kernel_length(core, host_id, &rows.kernel) {
            Ok(kernel_length_cycles) => {
                let failed_sites: BTreeSet<WaitSite> = rows.site_failures.keys().copied().collect();
                parsed.issues.extend(rows.site_failures.into_values());
                rows.waits.retain(|(site, _), _| !failed_sites.contains(site));
                let wait = wait_observations(core, host_id, rows.waits, options, &mut parsed.issues);
                parsed.kernels.push(KernelRecord {
                    core,
                    host_id,
                    kernel_length_cycles,
                    wait,
                });
            }
            Err(issue) => parsed.issues.push(issue),
        }
    }

    Ok(parsed)
}

fn is_header(record: &csv::StringRecord) -> bool {
    record.len() >= MIN_COLUMNS && record.get(COL_PCIE).is_some_and(|f| f.to_ascii_lowercase().contains("pcie"))
}

struct Row {
    time: u64,
    data: u64,
}

fn field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    line: u64,
    index: usize,
    column: &'static str,
) -> Result<T, MalformedLog> {
    let raw = &record[index];
    raw.parse().map_err(|_| MalformedLog::BadField {
        line,
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Core and host id of a row; without them the row cannot be attributed.
fn parse_key(record: &csv::StringRecord, line: u64) -> Result<(CoreId, u64), MalformedLog> {
    let core = CoreId::new(
        field(record, line, COL_PCIE, "pcie")?,
        field(record, line, COL_CORE_X, "core_x")?,
        field(record, line, COL_CORE_Y, "core_y")?,
    );
    Ok((core, field(record, line, COL_HOST_ID, "run_host_id")?))
}

fn parse_values(record: &csv::StringRecord, line: u64) -> Result<Row, MalformedLog> {
    Ok(Row {
        time: field(record, line, COL_TIME, "time_cycles")?,
        data: field(record, line, COL_DATA, "data")?,
    })
}

fn kernel_length(core: CoreId, host_id: u64, threads: &BTreeMap<String, ThreadMarkers>) -> Result<u64, MalformedLog> {
    let mut start = u64::MAX;
    let mut end = 0u64;
    for (thread, markers) in threads {
        for (marker, times) in [(ZONE_START, &markers.starts), (ZONE_END, &markers.ends)] {
            match times.len() {
                1 => {}
                0 => {
                    return Err(MalformedLog::MissingZoneMarker {
                        core,
                        host_id,
                        thread: thread.clone(),
                        marker: marker.to_string(),
                    })
                }
                count => {
                    return Err(MalformedLog::DuplicateZoneMarker {
                        core,
                        host_id,
                        thread: thread.clone(),
                        marker: marker.to_string(),
                        count,
                    })
                }
            }
        }
        let (s, e) = (markers.starts[0], markers.ends[0]);
        if e < s {
            return Err(MalformedLog::EndBeforeStart { core, host_id, start: s, end: e });
        }
        start = start.min(s);
        end = end.max(e);
    }
    Ok(end - start)
}

fn wait_observations(
    core: CoreId,
    host_id: u64,
    waits: BTreeMap<(WaitSite, String), Vec<(u64, u64)>>,
    options: &ParseOptions,
    issues: &mut Vec<MalformedLog>,
) -> WaitObservations {
    let mut observations = WaitObservations::default();
    if options.variant == Variant::Baseline {
        if !waits.is_empty() {
            tracing::warn!(%core, host_id, "baseline log carries wait-site zones; ignored");
        }
        return observations;
    }

    for site in WaitSite::ALL {
        let mut reporters: Vec<&Vec<(u64, u64)>> = waits
            .iter()
            .filter(|((s, _), _)| *s == site)
            .map(|(_, entries)| entries)
            .collect();
        match reporters.len() {
            0 => continue,
            1 => {}
            threads => {
                issues.push(MalformedLog::AmbiguousWaitSite { core, host_id, site, threads });
                continue;
            }
        }
        let mut entries = reporters.remove(0).clone();
        // Stable: equal timestamps keep file order.
        entries.sort_by_key(|(time, _)| *time);

        let observation = match options.variant {
            Variant::Profiler => WaitObservation::ZoneCycles(entries.iter().map(|(_, d)| *d).sum()),
            Variant::Counter => {
                let mut check = PublicationCheck::new(options.expected_max_iterations);
                let mut out_of_range = None;
                for &(_, data) in &entries {
                    match u32::try_from(data) {
                        Ok(value) => check.observe(value),
                        Err(_) => {
                            out_of_range = Some(data);
                            break;
                        }
                    }
                }
                if let Some(value) = out_of_range {
                    issues.push(MalformedLog::CounterOutOfRange { core, host_id, site, value });
                    continue;
                }
                let Some(iterations) = check.last() else {
                    continue;
                };
                WaitObservation::Counter(CounterReading {
                    iterations,
                    overflow: check.overflow(),
                })
            }
            Variant::Baseline => continue,
        };
        *observations.site_mut(site) = Some(observation);
    }
    observations
}
