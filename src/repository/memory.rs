//! In-process storage backend
//!
//! State lives behind a single async mutex. A transaction holds the lock for
//! its whole lifetime and works on a staged copy that replaces the shared
//! state on commit, so transactions are fully serialized. The same
//! uniqueness rules as the SQL schema are enforced on write.
//!
//! An ambient session must not be used by a task that already holds an open
//! transaction on the same database: it would wait on the lock forever.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AttendanceStore, Database, ScheduleStore, Session, Transaction, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{Attendance, AttendanceFilter, Schedule, ScheduleFilter, UserProfile, WeekdaySet},
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    agencies: BTreeSet<Uuid>,
    users: HashMap<Uuid, UserProfile>,
    schedules: HashMap<Uuid, Schedule>,
    attendance: HashMap<Uuid, Attendance>,
}

impl MemoryState {
    fn check_schedule_constraints(&self, schedule: &Schedule) -> AppResult<()> {
        let others = self
            .schedules
            .values()
            .filter(|s| s.agency_id == schedule.agency_id && s.id != schedule.id);
        for other in others {
            if other.name == schedule.name {
                return Err(AppError::ScheduleNameExists);
            }
            if other.is_default && schedule.is_default {
                return Err(AppError::DefaultScheduleExists);
            }
        }
        Ok(())
    }

    fn user_schedule_for_weekday(&self, agency_id: Uuid, user_id: Uuid, weekday: u8) -> Option<Schedule> {
        let mut candidates: Vec<&Schedule> = self
            .schedules
            .values()
            .filter(|s| {
                s.agency_id == agency_id && s.covers(weekday) && s.assigned_user_ids.contains(&user_id)
            })
            .collect();
        // created_at DESC, id ASC
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        candidates.first().map(|s| (*s).clone())
    }

    fn overlapping_assignments(
        &self,
        agency_id: Uuid,
        exclude_schedule_id: Option<Uuid>,
        user_ids: &[Uuid],
        days: WeekdaySet,
    ) -> Vec<Uuid> {
        let overlapping: BTreeSet<Uuid> = self
            .schedules
            .values()
            .filter(|s| s.agency_id == agency_id && Some(s.id) != exclude_schedule_id)
            .filter(|s| s.days_of_week.intersects(&days))
            .flat_map(|s| s.assigned_user_ids.iter().copied())
            .filter(|u| user_ids.contains(u))
            .collect();
        overlapping.into_iter().collect()
    }

    fn list_schedules(&self, agency_id: Uuid, filter: &ScheduleFilter) -> Vec<Schedule> {
        let mut rows: Vec<Schedule> = self
            .schedules
            .values()
            .filter(|s| s.agency_id == agency_id && filter.matches(s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        filter.pagination.apply(rows)
    }

    fn attendance_for_day(&self, agency_id: Uuid, user_id: Uuid, date: NaiveDate) -> Option<Attendance> {
        self.attendance
            .values()
            .find(|a| a.agency_id == agency_id && a.user_id == user_id && a.date == date)
            .cloned()
    }

    fn list_attendance(&self, agency_id: Uuid, filter: &AttendanceFilter) -> Vec<Attendance> {
        let mut rows: Vec<Attendance> = self
            .attendance
            .values()
            .filter(|a| a.agency_id == agency_id && filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.check_in_time.cmp(&a.check_in_time)));
        filter.pagination.apply(rows)
    }

    fn close_attendance(&mut self, attendance: &Attendance) -> AppResult<()> {
        let stored = self
            .attendance
            .get_mut(&attendance.id)
            .ok_or(AppError::AttendanceNotFound)?;
        if stored.is_closed() {
            return Err(AppError::AttendanceAlreadyClosed);
        }
        stored.check_out_time = attendance.check_out_time;
        stored.method_out = attendance.method_out;
        stored.updated_at = attendance.updated_at;
        Ok(())
    }
}

/// In-memory database, cheap to clone
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_agency(&self, agency_id: Uuid) {
        self.state.lock().await.agencies.insert(agency_id);
    }

    /// Register a user (and its agency)
    pub async fn add_user(&self, user: UserProfile) {
        let mut state = self.state.lock().await;
        state.agencies.insert(user.agency_id);
        state.users.insert(user.id, user);
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn session(&self) -> AppResult<Box<dyn Session>> {
        Ok(Box::new(MemorySession {
            mode: Mode::Ambient(self.state.clone()),
        }))
    }

    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemorySession {
            mode: Mode::Transaction { guard, staged },
        }))
    }
}

enum Mode {
    Ambient(Arc<Mutex<MemoryState>>),
    Transaction {
        guard: OwnedMutexGuard<MemoryState>,
        staged: MemoryState,
    },
}

pub struct MemorySession {
    mode: Mode,
}

impl MemorySession {
    async fn with_state<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut MemoryState) -> R + Send,
        R: Send,
    {
        match &mut self.mode {
            Mode::Ambient(shared) => {
                let mut state = shared.lock().await;
                f(&mut state)
            }
            Mode::Transaction { staged, .. } => f(staged),
        }
    }
}

#[async_trait]
impl Transaction for MemorySession {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let session = *self;
        if let Mode::Transaction { mut guard, staged } = session.mode {
            *guard = staged;
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemorySession {
    async fn schedule_by_id(&mut self, id: Uuid) -> AppResult<Option<Schedule>> {
        Ok(self.with_state(|s| s.schedules.get(&id).cloned()).await)
    }

    async fn schedule_by_name(&mut self, agency_id: Uuid, name: &str) -> AppResult<Option<Schedule>> {
        Ok(self
            .with_state(|s| {
                s.schedules
                    .values()
                    .find(|sc| sc.agency_id == agency_id && sc.name == name)
                    .cloned()
            })
            .await)
    }

    async fn default_schedule(&mut self, agency_id: Uuid) -> AppResult<Option<Schedule>> {
        Ok(self
            .with_state(|s| {
                s.schedules
                    .values()
                    .find(|sc| sc.agency_id == agency_id && sc.is_default)
                    .cloned()
            })
            .await)
    }

    async fn user_schedule_for_weekday(
        &mut self,
        agency_id: Uuid,
        user_id: Uuid,
        weekday: u8,
    ) -> AppResult<Option<Schedule>> {
        Ok(self
            .with_state(|s| s.user_schedule_for_weekday(agency_id, user_id, weekday))
            .await)
    }

    async fn overlapping_assignments(
        &mut self,
        agency_id: Uuid,
        exclude_schedule_id: Option<Uuid>,
        user_ids: &[Uuid],
        days: WeekdaySet,
    ) -> AppResult<Vec<Uuid>> {
        Ok(self
            .with_state(|s| s.overlapping_assignments(agency_id, exclude_schedule_id, user_ids, days))
            .await)
    }

    async fn list_schedules(&mut self, agency_id: Uuid, filter: &ScheduleFilter) -> AppResult<Vec<Schedule>> {
        Ok(self.with_state(|s| s.list_schedules(agency_id, filter)).await)
    }

    async fn insert_schedule(&mut self, schedule: &Schedule) -> AppResult<()> {
        self.with_state(|s| {
            s.check_schedule_constraints(schedule)?;
            s.schedules.insert(schedule.id, schedule.clone());
            Ok(())
        })
        .await
    }

    async fn update_schedule(&mut self, schedule: &Schedule) -> AppResult<()> {
        self.with_state(|s| {
            if !s.schedules.contains_key(&schedule.id) {
                return Err(AppError::ScheduleNotFound);
            }
            s.check_schedule_constraints(schedule)?;
            s.schedules.insert(schedule.id, schedule.clone());
            Ok(())
        })
        .await
    }

    async fn delete_schedule(&mut self, id: Uuid) -> AppResult<()> {
        self.with_state(|s| {
            s.schedules
                .remove(&id)
                .map(|_| ())
                .ok_or(AppError::ScheduleNotFound)
        })
        .await
    }
}

#[async_trait]
impl UserStore for MemorySession {
    async fn user_by_id(&mut self, id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.with_state(|s| s.users.get(&id).cloned()).await)
    }

    async fn users_by_agency(&mut self, agency_id: Uuid) -> AppResult<Vec<UserProfile>> {
        Ok(self
            .with_state(|s| {
                let mut users: Vec<UserProfile> = s
                    .users
                    .values()
                    .filter(|u| u.agency_id == agency_id)
                    .cloned()
                    .collect();
                users.sort_by_key(|u| u.id);
                users
            })
            .await)
    }

    /// Transactions already hold the whole state; only existence is checked
    async fn lock_agency(&mut self, agency_id: Uuid) -> AppResult<bool> {
        Ok(self.with_state(|s| s.agencies.contains(&agency_id)).await)
    }
}

#[async_trait]
impl AttendanceStore for MemorySession {
    async fn attendance_for_day(
        &mut self,
        agency_id: Uuid,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Option<Attendance>> {
        Ok(self
            .with_state(|s| s.attendance_for_day(agency_id, user_id, date))
            .await)
    }

    async fn insert_attendance(&mut self, attendance: &Attendance) -> AppResult<()> {
        self.with_state(|s| {
            if s
                .attendance_for_day(attendance.agency_id, attendance.user_id, attendance.date)
                .is_some()
            {
                return Err(AppError::AttendanceExists);
            }
            s.attendance.insert(attendance.id, attendance.clone());
            Ok(())
        })
        .await
    }

    async fn close_attendance(&mut self, attendance: &Attendance) -> AppResult<()> {
        self.with_state(|s| s.close_attendance(attendance)).await
    }

    async fn list_attendance(&mut self, agency_id: Uuid, filter: &AttendanceFilter) -> AppResult<Vec<Attendance>> {
        Ok(self.with_state(|s| s.list_attendance(agency_id, filter)).await)
    }
}
