//! In-memory occupancy grid for one class's weekly routine.
//!
//! A multi-period assignment is stored once at its anchor cell; the periods
//! it spans past the first hold continuation markers pointing back at the
//! anchor. All range arithmetic works on period *indices* in the day's
//! ordered period sequence, never on wall-clock times, so the sequence is
//! sorted once at construction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

pub const BREAK_CODE: &str = "BREAK";
pub const LC_CODE: &str = "LC";

/// Composite cell key. One occupied slot per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub day_id: String,
    pub period_id: String,
}

impl SlotKey {
    pub fn new(day_id: impl Into<String>, period_id: impl Into<String>) -> Self {
        Self {
            day_id: day_id.into(),
            period_id: period_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRef {
    Subject(String),
    Break,
    LibraryConsultation,
}

impl SubjectRef {
    pub fn from_wire(code: &str) -> Self {
        match code {
            BREAK_CODE => SubjectRef::Break,
            LC_CODE => SubjectRef::LibraryConsultation,
            id => SubjectRef::Subject(id.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            SubjectRef::Subject(id) => id,
            SubjectRef::Break => BREAK_CODE,
            SubjectRef::LibraryConsultation => LC_CODE,
        }
    }

    /// BREAK and LC occupy cells but never participate in teacher checks.
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, SubjectRef::Subject(_))
    }

    pub fn subject_id(&self) -> Option<&str> {
        match self {
            SubjectRef::Subject(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherRef {
    pub id: String,
    pub name: String,
}

/// One sub-assignment of a multi-subject lab cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LabSubject {
    pub subject_id: String,
    pub subject_name: String,
    pub is_half_lab: bool,
    pub span: usize,
    pub lead_teacher: Option<TeacherRef>,
    pub assistants: Vec<TeacherRef>,
    pub group: Option<String>,
    pub lab_room: Option<String>,
}

impl LabSubject {
    fn teachers(&self) -> Vec<&TeacherRef> {
        self.lead_teacher.iter().chain(self.assistants.iter()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub subject: SubjectRef,
    pub subject_name: String,
    pub is_lab: bool,
    pub is_half_lab: bool,
    /// Consecutive periods consumed starting at the anchor, >= 1.
    pub span: usize,
    pub lead_teacher: Option<TeacherRef>,
    /// Up to three assistants.
    pub assistants: Vec<TeacherRef>,
    pub group: Option<String>,
    pub lab_room: Option<String>,
    pub lab_group_id: Option<String>,
    /// Sibling sub-assignments of a multi-subject lab sharing this cell.
    pub lab_subjects: Vec<LabSubject>,
}

impl Assignment {
    pub fn is_multi_subject_lab(&self) -> bool {
        !self.lab_subjects.is_empty()
    }

    /// Every teacher occupying this cell, across lab sub-subjects too.
    pub fn teachers(&self) -> Vec<&TeacherRef> {
        if self.is_multi_subject_lab() {
            let mut out = Vec::new();
            for sub in &self.lab_subjects {
                out.extend(sub.teachers());
            }
            out
        } else {
            self.lead_teacher.iter().chain(self.assistants.iter()).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Anchor(Assignment),
    Continuation { anchor: SlotKey },
}

#[derive(Debug, Clone)]
pub struct PeriodSlot {
    pub id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub sort_order: i64,
}

/// The day's ordered period list. Sorted by `sort_order` exactly once so
/// that index arithmetic over spans is valid everywhere else.
#[derive(Debug, Clone)]
pub struct PeriodSequence {
    slots: Vec<PeriodSlot>,
}

impl PeriodSequence {
    pub fn new(mut slots: Vec<PeriodSlot>) -> Self {
        slots.sort_by_key(|s| s.sort_order);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index_of(&self, period_id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.id == period_id)
    }

    /// Period ids covered by `[start, start + span)`, clamped to the day.
    pub fn ids_from(&self, start: usize, span: usize) -> Vec<String> {
        self.slots
            .iter()
            .skip(start)
            .take(span)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Human label like `10:15-12:35` for an inclusive index range.
    pub fn time_label(&self, start: usize, end: usize) -> String {
        let first = self.slots.get(start);
        let last = self.slots.get(end.min(self.slots.len().saturating_sub(1)));
        match (first, last) {
            (Some(a), Some(b)) => format!("{}-{}", a.start_time, b.end_time),
            _ => String::new(),
        }
    }
}

/// One detected double-booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub teacher_id: String,
    pub teacher_name: String,
    pub class_name: String,
    pub subject_name: String,
    pub time_slot: String,
}

/// Conflict scan across other classes, keyed by teacher, day, and the
/// explicit period ids of the queried range. Implementations already know
/// which class to exclude. Errors propagate: availability is fail-closed.
pub trait ConflictLookup {
    fn teacher_conflicts(
        &self,
        teacher: &TeacherRef,
        day_id: &str,
        period_ids: &[String],
    ) -> anyhow::Result<Vec<Conflict>>;
}

/// Lookup for contexts with no cross-class data (pure-grid tests).
pub struct NoCrossClass;

impl ConflictLookup for NoCrossClass {
    fn teacher_conflicts(
        &self,
        _teacher: &TeacherRef,
        _day_id: &str,
        _period_ids: &[String],
    ) -> anyhow::Result<Vec<Conflict>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMode {
    Move,
    Copy,
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("{0}")]
    Validation(String),
    #[error("span of {span} exceeds the {remaining} period(s) remaining in the day")]
    SpanOverflow { span: usize, remaining: usize },
    #[error("teacher busy in {} conflicting slot(s)", conflicts.len())]
    TeacherBusy { conflicts: Vec<Conflict> },
    #[error("target slot is already occupied")]
    SlotOccupied,
    #[error("unknown period in slot key")]
    UnknownSlot,
    #[error("conflict lookup failed: {0}")]
    Lookup(#[from] anyhow::Error),
}

/// Flattened persistence/wire row: one per anchored entry (one per
/// sub-subject for multi-subject labs) plus continuation markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineRow {
    pub day_id: String,
    pub period_id: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub is_lab: bool,
    #[serde(default)]
    pub is_half_lab: bool,
    #[serde(default = "default_span")]
    pub num_periods: i64,
    #[serde(default)]
    pub lead_teacher_id: Option<String>,
    #[serde(default)]
    pub lead_teacher_name: Option<String>,
    #[serde(default)]
    pub assist_teacher_1_id: Option<String>,
    #[serde(default)]
    pub assist_teacher_1_name: Option<String>,
    #[serde(default)]
    pub assist_teacher_2_id: Option<String>,
    #[serde(default)]
    pub assist_teacher_2_name: Option<String>,
    #[serde(default)]
    pub assist_teacher_3_id: Option<String>,
    #[serde(default)]
    pub assist_teacher_3_name: Option<String>,
    #[serde(default)]
    pub room_no: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub lab_room: Option<String>,
    #[serde(default)]
    pub lab_group_id: Option<String>,
    #[serde(default)]
    pub is_continuation: bool,
}

fn default_span() -> i64 {
    1
}

pub struct RoutineGrid {
    class_id: String,
    class_name: String,
    periods: PeriodSequence,
    cells: BTreeMap<SlotKey, Cell>,
}

impl RoutineGrid {
    pub fn new(
        class_id: impl Into<String>,
        class_name: impl Into<String>,
        periods: PeriodSequence,
    ) -> Self {
        Self {
            class_id: class_id.into(),
            class_name: class_name.into(),
            periods,
            cells: BTreeMap::new(),
        }
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn cell(&self, key: &SlotKey) -> Option<&Cell> {
        self.cells.get(key)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&SlotKey, &Cell)> {
        self.cells.iter()
    }

    /// Validate and apply a placement at `(day, period)`.
    ///
    /// Rejects spans that overrun the day and teacher double-bookings
    /// (excluding whatever currently anchors the edited cell). On success
    /// the previous occupant's whole run is cleared before the anchor and
    /// its continuation markers are written.
    pub fn place(
        &mut self,
        day_id: &str,
        period_id: &str,
        assignment: Assignment,
        lookup: &dyn ConflictLookup,
    ) -> Result<(), GridError> {
        let start = self
            .periods
            .index_of(period_id)
            .ok_or(GridError::UnknownSlot)?;
        if assignment.span < 1 {
            return Err(GridError::Validation("span must be at least 1".into()));
        }
        if !assignment.subject.is_sentinel() && assignment.lead_teacher.is_none() {
            return Err(GridError::Validation("a lead teacher is required".into()));
        }
        if assignment.assistants.len() > 3 {
            return Err(GridError::Validation(
                "at most three assistant teachers are allowed".into(),
            ));
        }
        let remaining = self.periods.len() - start;
        if assignment.span > remaining {
            return Err(GridError::SpanOverflow {
                span: assignment.span,
                remaining,
            });
        }

        let key = SlotKey::new(day_id, period_id);
        if !assignment.subject.is_sentinel() {
            let teachers: Vec<TeacherRef> =
                assignment.teachers().into_iter().cloned().collect();
            let conflicts = self.conflicts_for(
                &teachers,
                day_id,
                start,
                assignment.span,
                Some(&key),
                lookup,
            )?;
            if !conflicts.is_empty() {
                return Err(GridError::TeacherBusy { conflicts });
            }
        }

        self.clear_run_at(&key);
        self.install(key, assignment);
        Ok(())
    }

    /// Place a multi-subject lab: each sub-assignment is validated and
    /// conflict-checked over its own span, then one cell is anchored with
    /// the maximum span and a fresh lab-group id.
    pub fn place_lab(
        &mut self,
        day_id: &str,
        period_id: &str,
        subs: Vec<LabSubject>,
        lab_group_id: String,
        lookup: &dyn ConflictLookup,
    ) -> Result<(), GridError> {
        let start = self
            .periods
            .index_of(period_id)
            .ok_or(GridError::UnknownSlot)?;
        if subs.is_empty() {
            return Err(GridError::Validation(
                "a multi-subject lab needs at least one subject".into(),
            ));
        }
        let remaining = self.periods.len() - start;
        let max_span = subs.iter().map(|s| s.span.max(1)).max().unwrap_or(1);
        if max_span > remaining {
            return Err(GridError::SpanOverflow {
                span: max_span,
                remaining,
            });
        }

        let key = SlotKey::new(day_id, period_id);
        let mut conflicts = Vec::new();
        for sub in &subs {
            if sub.lead_teacher.is_none() {
                return Err(GridError::Validation(format!(
                    "lab subject {} needs a lead teacher",
                    sub.subject_name
                )));
            }
            let teachers: Vec<TeacherRef> = sub.teachers().into_iter().cloned().collect();
            conflicts.extend(self.conflicts_for(
                &teachers,
                day_id,
                start,
                sub.span.max(1),
                Some(&key),
                lookup,
            )?);
        }
        if !conflicts.is_empty() {
            return Err(GridError::TeacherBusy { conflicts });
        }

        let first = subs[0].clone();
        let assignment = Assignment {
            subject: SubjectRef::Subject(first.subject_id),
            subject_name: first.subject_name,
            is_lab: true,
            is_half_lab: first.is_half_lab,
            span: max_span,
            lead_teacher: first.lead_teacher,
            assistants: first.assistants,
            group: first.group,
            lab_room: first.lab_room,
            lab_group_id: Some(lab_group_id),
            lab_subjects: subs,
        };

        self.clear_run_at(&key);
        self.install(key, assignment);
        Ok(())
    }

    /// Delete an anchor and every continuation marker it owns. Removing a
    /// continuation or an empty cell is a no-op; only anchors are deletable.
    pub fn remove(&mut self, day_id: &str, period_id: &str) -> bool {
        let key = SlotKey::new(day_id, period_id);
        match self.cells.get(&key) {
            Some(Cell::Anchor(_)) => {
                for k in self.run_keys(&key) {
                    self.cells.remove(&k);
                }
                true
            }
            _ => false,
        }
    }

    /// Move or copy an anchored assignment to another cell. The whole
    /// target range must be free (source's own run counts as free when
    /// moving), and teacher availability is re-validated at the target.
    pub fn move_or_copy(
        &mut self,
        source: &SlotKey,
        target: &SlotKey,
        mode: MoveMode,
        lookup: &dyn ConflictLookup,
    ) -> Result<(), GridError> {
        let mut placed = self.validate_move(source, target, mode, lookup)?;
        if mode == MoveMode::Move {
            for k in self.run_keys(source) {
                self.cells.remove(&k);
            }
        } else if placed.lab_group_id.is_some() {
            // A copied lab becomes its own persistence group.
            placed.lab_group_id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.install(target.clone(), placed);
        Ok(())
    }

    /// Dry-run of `move_or_copy`: same validation, no mutation. Backs the
    /// drag-hover drop-target probe.
    pub fn check_move(
        &self,
        source: &SlotKey,
        target: &SlotKey,
        mode: MoveMode,
        lookup: &dyn ConflictLookup,
    ) -> Result<(), GridError> {
        self.validate_move(source, target, mode, lookup).map(|_| ())
    }

    fn validate_move(
        &self,
        source: &SlotKey,
        target: &SlotKey,
        mode: MoveMode,
        lookup: &dyn ConflictLookup,
    ) -> Result<Assignment, GridError> {
        if source == target {
            return Err(GridError::Validation(
                "source and target are the same cell".into(),
            ));
        }
        let assignment = match self.cells.get(source) {
            Some(Cell::Anchor(a)) => a.clone(),
            _ => {
                return Err(GridError::Validation(
                    "source cell holds no anchored assignment".into(),
                ))
            }
        };

        let start = self
            .periods
            .index_of(&target.period_id)
            .ok_or(GridError::UnknownSlot)?;
        let remaining = self.periods.len() - start;
        if assignment.span > remaining {
            return Err(GridError::SpanOverflow {
                span: assignment.span,
                remaining,
            });
        }

        // The target range must not touch any other occupant. When moving,
        // the source's own run is about to be vacated and does not block.
        let source_run: HashSet<SlotKey> = if mode == MoveMode::Move {
            self.run_keys(source).into_iter().collect()
        } else {
            HashSet::new()
        };
        for pid in self.periods.ids_from(start, assignment.span) {
            let k = SlotKey::new(target.day_id.clone(), pid);
            if self.cells.contains_key(&k) && !source_run.contains(&k) {
                return Err(GridError::SlotOccupied);
            }
        }

        if !assignment.subject.is_sentinel() || assignment.is_multi_subject_lab() {
            let exclude = if mode == MoveMode::Move {
                Some(source)
            } else {
                None
            };
            let teachers: Vec<TeacherRef> =
                assignment.teachers().into_iter().cloned().collect();
            let conflicts = self.conflicts_for(
                &teachers,
                &target.day_id,
                start,
                assignment.span,
                exclude,
                lookup,
            )?;
            if !conflicts.is_empty() {
                return Err(GridError::TeacherBusy { conflicts });
            }
        }

        Ok(assignment)
    }

    /// Two-phase availability check for one teacher over
    /// `[period, period + span)` on a day: local scan of same-day anchors,
    /// then the cross-class lookup. Returns the union of conflicts; a
    /// lookup failure propagates (fail-closed).
    pub fn check_teacher(
        &self,
        teacher: &TeacherRef,
        day_id: &str,
        period_id: &str,
        span: usize,
        exclude: Option<&SlotKey>,
        lookup: &dyn ConflictLookup,
    ) -> Result<Vec<Conflict>, GridError> {
        let start = self
            .periods
            .index_of(period_id)
            .ok_or(GridError::UnknownSlot)?;
        self.conflicts_for(
            std::slice::from_ref(teacher),
            day_id,
            start,
            span.max(1),
            exclude,
            lookup,
        )
    }

    /// Non-blocking warning: the same (subject, lead teacher) pair anchors
    /// more than once on this day. Sentinels never count.
    pub fn has_duplicate_assignment(&self, day_id: &str, period_id: &str) -> bool {
        let key = SlotKey::new(day_id, period_id);
        let Some(Cell::Anchor(a)) = self.cells.get(&key) else {
            return false;
        };
        let Some(subject_id) = a.subject.subject_id() else {
            return false;
        };
        let Some(lead) = a.lead_teacher.as_ref() else {
            return false;
        };

        let mut count = 0;
        for cell in self.cells.iter().filter_map(|(k, c)| {
            if k.day_id == day_id {
                match c {
                    Cell::Anchor(other) => Some(other),
                    Cell::Continuation { .. } => None,
                }
            } else {
                None
            }
        }) {
            if cell.subject.subject_id() == Some(subject_id)
                && cell.lead_teacher.as_ref().map(|t| t.id.as_str()) == Some(lead.id.as_str())
            {
                count += 1;
            }
        }
        count > 1
    }

    /// Flatten to persistence rows: one row per anchored entry (one per
    /// sub-subject of a multi-subject lab, all sharing the lab-group id)
    /// plus marker rows for continuation cells.
    pub fn flatten(&self) -> Vec<RoutineRow> {
        let mut rows = Vec::new();
        for (key, cell) in &self.cells {
            match cell {
                Cell::Continuation { .. } => rows.push(RoutineRow {
                    day_id: key.day_id.clone(),
                    period_id: key.period_id.clone(),
                    num_periods: 1,
                    is_continuation: true,
                    ..RoutineRow::default()
                }),
                Cell::Anchor(a) if a.is_multi_subject_lab() => {
                    for sub in &a.lab_subjects {
                        rows.push(RoutineRow {
                            day_id: key.day_id.clone(),
                            period_id: key.period_id.clone(),
                            subject_id: Some(sub.subject_id.clone()),
                            subject_name: Some(sub.subject_name.clone()),
                            is_lab: true,
                            is_half_lab: sub.is_half_lab,
                            num_periods: sub.span.max(1) as i64,
                            lead_teacher_id: sub.lead_teacher.as_ref().map(|t| t.id.clone()),
                            lead_teacher_name: sub.lead_teacher.as_ref().map(|t| t.name.clone()),
                            assist_teacher_1_id: sub.assistants.first().map(|t| t.id.clone()),
                            assist_teacher_1_name: sub.assistants.first().map(|t| t.name.clone()),
                            assist_teacher_2_id: sub.assistants.get(1).map(|t| t.id.clone()),
                            assist_teacher_2_name: sub.assistants.get(1).map(|t| t.name.clone()),
                            assist_teacher_3_id: sub.assistants.get(2).map(|t| t.id.clone()),
                            assist_teacher_3_name: sub.assistants.get(2).map(|t| t.name.clone()),
                            group: sub.group.clone(),
                            lab_room: sub.lab_room.clone(),
                            lab_group_id: a.lab_group_id.clone(),
                            ..RoutineRow::default()
                        });
                    }
                }
                Cell::Anchor(a) => rows.push(RoutineRow {
                    day_id: key.day_id.clone(),
                    period_id: key.period_id.clone(),
                    subject_id: Some(a.subject.as_wire().to_string()),
                    subject_name: Some(a.subject_name.clone()),
                    is_lab: a.is_lab,
                    is_half_lab: a.is_half_lab,
                    num_periods: a.span as i64,
                    lead_teacher_id: a.lead_teacher.as_ref().map(|t| t.id.clone()),
                    lead_teacher_name: a.lead_teacher.as_ref().map(|t| t.name.clone()),
                    assist_teacher_1_id: a.assistants.first().map(|t| t.id.clone()),
                    assist_teacher_1_name: a.assistants.first().map(|t| t.name.clone()),
                    assist_teacher_2_id: a.assistants.get(1).map(|t| t.id.clone()),
                    assist_teacher_2_name: a.assistants.get(1).map(|t| t.name.clone()),
                    assist_teacher_3_id: a.assistants.get(2).map(|t| t.id.clone()),
                    assist_teacher_3_name: a.assistants.get(2).map(|t| t.name.clone()),
                    group: a.group.clone(),
                    lab_room: a.lab_room.clone(),
                    lab_group_id: a.lab_group_id.clone(),
                    ..RoutineRow::default()
                }),
            }
        }
        rows
    }

    /// Reconstruct the grouped in-memory shape from persisted rows. Rows
    /// sharing a lab-group id fold back into one anchored lab cell; stored
    /// continuation markers are ignored and regenerated from spans.
    pub fn rebuild(
        class_id: impl Into<String>,
        class_name: impl Into<String>,
        periods: PeriodSequence,
        rows: &[RoutineRow],
    ) -> Self {
        let mut grid = Self::new(class_id, class_name, periods);

        for row in rows.iter().filter(|r| !r.is_continuation) {
            let key = SlotKey::new(row.day_id.clone(), row.period_id.clone());
            if grid.cells.contains_key(&key) {
                // Later rows of an already-folded lab group.
                continue;
            }

            let assignment = match row.lab_group_id.as_deref() {
                Some(gid) => {
                    let subs: Vec<LabSubject> = rows
                        .iter()
                        .filter(|r| {
                            !r.is_continuation && r.lab_group_id.as_deref() == Some(gid)
                        })
                        .map(lab_subject_from_row)
                        .collect();
                    let max_span = subs.iter().map(|s| s.span.max(1)).max().unwrap_or(1);
                    let first = subs[0].clone();
                    Assignment {
                        subject: SubjectRef::Subject(first.subject_id),
                        subject_name: first.subject_name,
                        is_lab: true,
                        is_half_lab: first.is_half_lab,
                        span: max_span,
                        lead_teacher: first.lead_teacher,
                        assistants: first.assistants,
                        group: first.group,
                        lab_room: first.lab_room,
                        lab_group_id: Some(gid.to_string()),
                        lab_subjects: subs,
                    }
                }
                None => assignment_from_row(row),
            };
            grid.install(key, assignment);
        }

        grid
    }

    /// Keys of the anchor at (or owning) `key` plus all its continuations.
    fn run_keys(&self, key: &SlotKey) -> Vec<SlotKey> {
        let anchor_key = match self.cells.get(key) {
            Some(Cell::Anchor(_)) => key.clone(),
            Some(Cell::Continuation { anchor }) => anchor.clone(),
            None => return Vec::new(),
        };
        let Some(Cell::Anchor(a)) = self.cells.get(&anchor_key) else {
            return vec![anchor_key];
        };
        let Some(start) = self.periods.index_of(&anchor_key.period_id) else {
            return vec![anchor_key];
        };
        self.periods
            .ids_from(start, a.span)
            .into_iter()
            .map(|pid| SlotKey::new(anchor_key.day_id.clone(), pid))
            .collect()
    }

    /// Clear whatever run occupies `key`, following a continuation marker
    /// back to its owner so no orphaned markers survive.
    fn clear_run_at(&mut self, key: &SlotKey) {
        for k in self.run_keys(key) {
            self.cells.remove(&k);
        }
    }

    /// Write an anchor and its continuation markers. Any run overlapped by
    /// the new span is cleared first so continuations never orphan.
    fn install(&mut self, key: SlotKey, assignment: Assignment) {
        let Some(start) = self.periods.index_of(&key.period_id) else {
            return;
        };
        let span = assignment.span.max(1);
        for pid in self.periods.ids_from(start, span) {
            let k = SlotKey::new(key.day_id.clone(), pid);
            self.clear_run_at(&k);
        }
        for (i, pid) in self.periods.ids_from(start, span).into_iter().enumerate() {
            let k = SlotKey::new(key.day_id.clone(), pid);
            if i == 0 {
                self.cells.insert(k, Cell::Anchor(assignment.clone()));
            } else {
                self.cells.insert(
                    k,
                    Cell::Continuation {
                        anchor: key.clone(),
                    },
                );
            }
        }
    }

    fn conflicts_for(
        &self,
        teachers: &[TeacherRef],
        day_id: &str,
        start: usize,
        span: usize,
        exclude: Option<&SlotKey>,
        lookup: &dyn ConflictLookup,
    ) -> Result<Vec<Conflict>, GridError> {
        let q_end = start + span - 1;

        // When the edited cell anchors an assignment, that whole run is
        // exempt, or its own later periods would read as conflicts. A
        // continuation cell exempts nothing: its owner belongs to another
        // anchor and still blocks.
        let excluded: HashSet<SlotKey> = match exclude {
            Some(k) => match self.cells.get(k) {
                Some(Cell::Anchor(_)) => self.run_keys(k).into_iter().collect(),
                _ => std::iter::once(k.clone()).collect(),
            },
            None => HashSet::new(),
        };

        let mut conflicts = Vec::new();
        for (key, cell) in &self.cells {
            if key.day_id != day_id {
                continue;
            }
            if excluded.contains(key) {
                continue;
            }
            let Cell::Anchor(a) = cell else {
                continue;
            };
            let Some(a_start) = self.periods.index_of(&key.period_id) else {
                continue;
            };
            let a_end = a_start + a.span.saturating_sub(1);
            // Two inclusive ranges overlap iff start1 <= end2 && start2 <= end1.
            if !(a_start <= q_end && start <= a_end) {
                continue;
            }
            let occupants = a.teachers();
            for teacher in teachers {
                if occupants.iter().any(|t| t.id == teacher.id) {
                    conflicts.push(Conflict {
                        teacher_id: teacher.id.clone(),
                        teacher_name: teacher.name.clone(),
                        class_name: self.class_name.clone(),
                        subject_name: a.subject_name.clone(),
                        time_slot: self.periods.time_label(a_start, a_end),
                    });
                }
            }
        }

        let period_ids = self.periods.ids_from(start, span);
        for teacher in teachers {
            conflicts.extend(lookup.teacher_conflicts(teacher, day_id, &period_ids)?);
        }
        Ok(conflicts)
    }
}

fn teacher_from(id: &Option<String>, name: &Option<String>) -> Option<TeacherRef> {
    id.as_ref().map(|id| TeacherRef {
        id: id.clone(),
        name: name.clone().unwrap_or_default(),
    })
}

fn assistants_from_row(row: &RoutineRow) -> Vec<TeacherRef> {
    [
        teacher_from(&row.assist_teacher_1_id, &row.assist_teacher_1_name),
        teacher_from(&row.assist_teacher_2_id, &row.assist_teacher_2_name),
        teacher_from(&row.assist_teacher_3_id, &row.assist_teacher_3_name),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn lab_subject_from_row(row: &RoutineRow) -> LabSubject {
    LabSubject {
        subject_id: row.subject_id.clone().unwrap_or_default(),
        subject_name: row.subject_name.clone().unwrap_or_default(),
        is_half_lab: row.is_half_lab,
        span: row.num_periods.max(1) as usize,
        lead_teacher: teacher_from(&row.lead_teacher_id, &row.lead_teacher_name),
        assistants: assistants_from_row(row),
        group: row.group.clone(),
        lab_room: row.lab_room.clone(),
    }
}

fn assignment_from_row(row: &RoutineRow) -> Assignment {
    Assignment {
        subject: SubjectRef::from_wire(row.subject_id.as_deref().unwrap_or("")),
        subject_name: row.subject_name.clone().unwrap_or_default(),
        is_lab: row.is_lab,
        is_half_lab: row.is_half_lab,
        span: row.num_periods.max(1) as usize,
        lead_teacher: teacher_from(&row.lead_teacher_id, &row.lead_teacher_name),
        assistants: assistants_from_row(row),
        group: row.group.clone(),
        lab_room: row.lab_room.clone(),
        lab_group_id: row.lab_group_id.clone(),
        lab_subjects: Vec::new(),
    }
}
