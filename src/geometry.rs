//! Slot and tester-site geometry
//!
//! Maps tray slots and tester sites to plunge poses from two taught
//! reference poses per tray (or per fixture). Everything here is pure:
//! no motion, no I/O.

use crate::{
    config::{CalibrationConfig, TrayCalibration},
    pose::Pose,
    CellError, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slots in one tray row
pub const SLOTS_PER_ROW: u8 = 25;
/// Slots in a full tray (two rows)
pub const SLOT_COUNT: u8 = 50;
/// X distance between neighbouring slots in a row
pub const SLOT_PITCH_MM: f64 = 10.0;
/// Y distance from the first row to the second
pub const ROW_OFFSET_MM: f64 = 166.0;
/// Approach pose height above the plunge pose
pub const CLEAR_HEIGHT_MM: f64 = 200.0;
/// Hover pose height above the plunge pose
pub const HOVER_HEIGHT_MM: f64 = 30.0;
/// Y shift applied to even-numbered tester sites
pub const EVEN_SITE_SHIFT_MM: f64 = 25.0;
pub const TESTER_COUNT: u8 = 3;
pub const SITES_PER_TESTER: u8 = 4;

/// The three physical trays the cell transfers modules between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrayType {
    Input,
    Fail,
    Pass,
}

impl TrayType {
    pub const ALL: [TrayType; 3] = [TrayType::Input, TrayType::Fail, TrayType::Pass];

    pub fn name(&self) -> &'static str {
        match self {
            TrayType::Input => "input",
            TrayType::Fail => "fail",
            TrayType::Pass => "pass",
        }
    }
}

impl fmt::Display for TrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrayType {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" => Ok(TrayType::Input),
            "fail" => Ok(TrayType::Fail),
            "pass" => Ok(TrayType::Pass),
            other => Err(CellError::GeometryContractViolation(format!("unknown tray '{}'", other))),
        }
    }
}

/// 1-based tray slot, guaranteed to lie in `1..=50`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub const FIRST: SlotIndex = SlotIndex(1);
    pub const LAST: SlotIndex = SlotIndex(SLOT_COUNT);

    pub fn get(&self) -> u8 {
        self.0
    }

    /// The following slot, or `None` past the end of the tray
    pub fn next(&self) -> Option<SlotIndex> {
        (self.0 < SLOT_COUNT).then(|| SlotIndex(self.0 + 1))
    }

    /// Every slot in scan order
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (1..=SLOT_COUNT).map(SlotIndex)
    }

    pub fn in_second_row(&self) -> bool {
        self.0 > SLOTS_PER_ROW
    }

    /// Position within its own row, starting at 0
    fn row_offset(&self) -> u8 {
        if self.in_second_row() {
            self.0 - SLOTS_PER_ROW - 1
        } else {
            self.0 - 1
        }
    }
}

impl TryFrom<u32> for SlotIndex {
    type Error = CellError;

    fn try_from(value: u32) -> Result<Self> {
        if (1..=SLOT_COUNT as u32).contains(&value) {
            Ok(SlotIndex(value as u8))
        } else {
            Err(CellError::GeometryContractViolation(format!(
                "slot index {} outside 1..={}",
                value, SLOT_COUNT
            )))
        }
    }
}

impl From<SlotIndex> for u32 {
    fn from(slot: SlotIndex) -> Self {
        slot.0 as u32
    }
}

impl FromStr for SlotIndex {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        let value: u32 = s.trim().parse().map_err(|_| {
            CellError::GeometryContractViolation(format!("slot index '{}' is not a number", s))
        })?;
        SlotIndex::try_from(value)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tester fixture number, `1..=3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TesterId(u8);

/// Site within a tester fixture, `1..=4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SiteId(u8);

impl TesterId {
    pub fn new(id: u8) -> Result<Self> {
        if (1..=TESTER_COUNT).contains(&id) {
            Ok(TesterId(id))
        } else {
            Err(CellError::GeometryContractViolation(format!(
                "tester {} outside 1..={}",
                id, TESTER_COUNT
            )))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    fn index(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl SiteId {
    pub fn new(id: u8) -> Result<Self> {
        if (1..=SITES_PER_TESTER).contains(&id) {
            Ok(SiteId(id))
        } else {
            Err(CellError::GeometryContractViolation(format!(
                "site {} outside 1..={}",
                id, SITES_PER_TESTER
            )))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Sites 3 and 4 sit under the fixture's "C" reference pose
    fn uses_site_c(&self) -> bool {
        self.0 > 2
    }

    fn is_even(&self) -> bool {
        self.0 % 2 == 0
    }
}

impl TryFrom<u8> for TesterId {
    type Error = CellError;

    fn try_from(value: u8) -> Result<Self> {
        TesterId::new(value)
    }
}

impl TryFrom<u8> for SiteId {
    type Error = CellError;

    fn try_from(value: u8) -> Result<Self> {
        SiteId::new(value)
    }
}

impl From<TesterId> for u8 {
    fn from(id: TesterId) -> Self {
        id.0
    }
}

impl From<SiteId> for u8 {
    fn from(id: SiteId) -> Self {
        id.0
    }
}

fn parse_id<T>(s: &str, what: &str, make: fn(u8) -> Result<T>) -> Result<T> {
    let id: u8 = s.trim().parse().map_err(|_| {
        CellError::GeometryContractViolation(format!("{} '{}' is not a number", what, s))
    })?;
    make(id)
}

impl FromStr for TesterId {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        parse_id(s, "tester", TesterId::new)
    }
}

impl FromStr for SiteId {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        parse_id(s, "site", SiteId::new)
    }
}

impl fmt::Display for TesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three poses of one pick/place cycle, all derived from one plunge pose
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotPoses {
    pub approach: Pose,
    pub hover: Pose,
    pub plunge: Pose,
}

impl SlotPoses {
    pub fn from_plunge(plunge: Pose) -> Self {
        Self {
            approach: plunge.offset_z(CLEAR_HEIGHT_MM),
            hover: plunge.offset_z(HOVER_HEIGHT_MM),
            plunge,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pose> {
        [&self.approach, &self.hover, &self.plunge].into_iter()
    }
}

/// Computes plunge poses from the calibration table
#[derive(Debug, Clone)]
pub struct SlotPositionCalculator {
    calibration: CalibrationConfig,
}

impl SlotPositionCalculator {
    pub fn new(calibration: CalibrationConfig) -> Result<Self> {
        calibration.validate()?;
        Ok(Self { calibration })
    }

    fn tray(&self, tray: TrayType) -> &TrayCalibration {
        match tray {
            TrayType::Input => &self.calibration.input,
            TrayType::Fail => &self.calibration.fail,
            TrayType::Pass => &self.calibration.pass,
        }
    }

    /// Plunge pose of a tray slot.
    ///
    /// Y is skew-compensated along the row using the slot 1 and slot 25
    /// reference poses; the second row is shifted by [`ROW_OFFSET_MM`].
    /// Z and orientation come from slot 1 unchanged.
    pub fn position(&self, tray: TrayType, slot: SlotIndex) -> Pose {
        let reference = self.tray(tray);
        let p1 = reference.slot_1;
        let skew = (reference.slot_25.y - p1.y) / (SLOTS_PER_ROW - 1) as f64;
        let step = slot.row_offset() as f64;

        let row_y = if slot.in_second_row() { p1.y - ROW_OFFSET_MM } else { p1.y };
        Pose {
            x: p1.x + SLOT_PITCH_MM * step,
            y: row_y + skew * step,
            ..p1
        }
    }

    pub fn slot_poses(&self, tray: TrayType, slot: SlotIndex) -> SlotPoses {
        SlotPoses::from_plunge(self.position(tray, slot))
    }

    /// Plunge pose of a tester site
    pub fn tester_position(&self, tester: TesterId, site: SiteId) -> Pose {
        let fixture = &self.calibration.testers[tester.index()];
        let reference = if site.uses_site_c() { fixture.site_c } else { fixture.site_a };

        if site.is_even() {
            reference.offset_y(-EVEN_SITE_SHIFT_MM)
        } else {
            reference
        }
    }

    pub fn tester_poses(&self, tester: TesterId, site: SiteId) -> SlotPoses {
        SlotPoses::from_plunge(self.tester_position(tester, site))
    }
}
