//! 医生可用时段管理
//!
//! 每个医生按日期维护一组时段。预订是对 `is_booked` 的一次性
//! 条件翻转：同一时段的第二次预订请求会直接失败，不存在先读后写的窗口。

use chrono::NaiveDate;
use clinic_core::{AvailabilityDay, ClinicError, Result, TimeSlot};
use std::collections::HashMap;
use uuid::Uuid;

/// 可用时段管理器
#[derive(Debug, Default)]
pub struct AvailabilityManager {
    days: HashMap<(Uuid, NaiveDate), AvailabilityDay>,
}

impl AvailabilityManager {
    /// 创建新的可用时段管理器
    pub fn new() -> Self {
        Self {
            days: HashMap::new(),
        }
    }

    /// 为医生新增某一天的时段列表
    pub fn add_day(&mut self, doctor_id: Uuid, date: NaiveDate, slots: Vec<TimeSlot>) -> Result<()> {
        Self::validate_slots(&slots)?;

        if self.days.contains_key(&(doctor_id, date)) {
            return Err(ClinicError::Validation(format!(
                "Availability for {} already exists, use replace instead",
                date
            )));
        }

        self.days.insert(
            (doctor_id, date),
            AvailabilityDay {
                doctor_id,
                date,
                slots,
                updated_at: chrono::Utc::now(),
            },
        );

        tracing::info!("Added availability for doctor {} on {}", doctor_id, date);
        Ok(())
    }

    /// 替换某一天的时段列表
    ///
    /// 该天存在已被预订的时段时替换被拒绝
    pub fn replace_day(
        &mut self,
        doctor_id: Uuid,
        date: NaiveDate,
        slots: Vec<TimeSlot>,
    ) -> Result<()> {
        Self::validate_slots(&slots)?;

        let day = self
            .days
            .get_mut(&(doctor_id, date))
            .ok_or_else(|| ClinicError::NotFound(format!("No availability on {}", date)))?;

        if day.has_booked_slot() {
            return Err(ClinicError::Validation(format!(
                "Cannot replace availability on {}: a slot is already booked",
                date
            )));
        }

        day.slots = slots;
        day.updated_at = chrono::Utc::now();

        tracing::info!("Replaced availability for doctor {} on {}", doctor_id, date);
        Ok(())
    }

    /// 删除某一天的时段列表
    ///
    /// 存在已被预订的时段时删除被拒绝，避免孤立关联的预约
    pub fn delete_day(&mut self, doctor_id: Uuid, date: NaiveDate) -> Result<()> {
        let day = self
            .days
            .get(&(doctor_id, date))
            .ok_or_else(|| ClinicError::NotFound(format!("No availability on {}", date)))?;

        if day.has_booked_slot() {
            return Err(ClinicError::Validation(format!(
                "Cannot delete availability on {}: a slot is already booked",
                date
            )));
        }

        self.days.remove(&(doctor_id, date));
        tracing::info!("Deleted availability for doctor {} on {}", doctor_id, date);
        Ok(())
    }

    /// 查询某一天的时段列表
    pub fn get_day(&self, doctor_id: Uuid, date: NaiveDate) -> Option<&AvailabilityDay> {
        self.days.get(&(doctor_id, date))
    }

    /// 查询医生的全部可用时段，按日期排序
    pub fn list_days(&self, doctor_id: Uuid) -> Vec<&AvailabilityDay> {
        let mut days: Vec<&AvailabilityDay> = self
            .days
            .values()
            .filter(|day| day.doctor_id == doctor_id)
            .collect();
        days.sort_by_key(|day| day.date);
        days
    }

    /// 预订指定时段
    ///
    /// 条件翻转：仅当时段存在且未被预订时成功，返回时段的时间范围
    pub fn book_slot(
        &mut self,
        doctor_id: Uuid,
        date: NaiveDate,
        slot_index: usize,
    ) -> Result<TimeSlot> {
        let day = self
            .days
            .get_mut(&(doctor_id, date))
            .ok_or_else(|| ClinicError::NotFound(format!("No availability on {}", date)))?;

        let slot = day.slots.get_mut(slot_index).ok_or_else(|| {
            ClinicError::NotFound(format!("Slot {} does not exist on {}", slot_index, date))
        })?;

        if slot.is_booked {
            return Err(ClinicError::Validation(format!(
                "Slot {} on {} is already booked",
                slot_index, date
            )));
        }

        slot.is_booked = true;
        day.updated_at = chrono::Utc::now();

        tracing::info!(
            "Booked slot {} for doctor {} on {}",
            slot_index,
            doctor_id,
            date
        );
        Ok(day.slots[slot_index].clone())
    }

    /// 释放指定时段
    ///
    /// 预约被拒绝或取消时调用。时段或日期已被医生移除时静默成功。
    pub fn release_slot(&mut self, doctor_id: Uuid, date: NaiveDate, slot_index: usize) {
        if let Some(day) = self.days.get_mut(&(doctor_id, date)) {
            if let Some(slot) = day.slots.get_mut(slot_index) {
                if slot.is_booked {
                    slot.is_booked = false;
                    day.updated_at = chrono::Utc::now();
                    tracing::info!(
                        "Released slot {} for doctor {} on {}",
                        slot_index,
                        doctor_id,
                        date
                    );
                }
            }
        }
    }

    /// 校验时段列表：时间范围合法且互不重叠
    fn validate_slots(slots: &[TimeSlot]) -> Result<()> {
        if slots.is_empty() {
            return Err(ClinicError::Validation(
                "Slot list cannot be empty".to_string(),
            ));
        }

        for slot in slots {
            if slot.start_time >= slot.end_time {
                return Err(ClinicError::Validation(format!(
                    "Slot {} - {} has non-positive duration",
                    slot.start_time, slot.end_time
                )));
            }
            if slot.is_booked {
                return Err(ClinicError::Validation(
                    "New slots cannot be created as booked".to_string(),
                ));
            }
        }

        let mut sorted: Vec<&TimeSlot> = slots.iter().collect();
        sorted.sort_by_key(|slot| slot.start_time);
        for pair in sorted.windows(2) {
            if pair[1].start_time < pair[0].end_time {
                return Err(ClinicError::Validation(format!(
                    "Slots {} - {} and {} - {} overlap",
                    pair[0].start_time, pair[0].end_time, pair[1].start_time, pair[1].end_time
                )));
            }
        }

        Ok(())
    }
}
