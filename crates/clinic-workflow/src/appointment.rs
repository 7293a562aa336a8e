//! 预约状态机
//!
//! 管理预约从申请到完成的完整生命周期状态转换

use clinic_core::{AppointmentStatus, ClinicError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 预约状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentEvent {
    Approved,  // 医生批准
    Rejected,  // 医生拒绝
    Completed, // 就诊完成
    Cancelled, // 批准后取消
}

/// 预约状态机
#[derive(Debug)]
pub struct AppointmentStateMachine {
    transitions: HashMap<(AppointmentStatus, AppointmentEvent), AppointmentStatus>,
}

impl AppointmentStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert(
            (AppointmentStatus::Pending, AppointmentEvent::Approved),
            AppointmentStatus::Approved,
        );
        transitions.insert(
            (AppointmentStatus::Pending, AppointmentEvent::Rejected),
            AppointmentStatus::Rejected,
        );
        transitions.insert(
            (AppointmentStatus::Approved, AppointmentEvent::Completed),
            AppointmentStatus::Completed,
        );
        transitions.insert(
            (AppointmentStatus::Approved, AppointmentEvent::Cancelled),
            AppointmentStatus::Cancelled,
        );

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &AppointmentStatus, event: &AppointmentEvent) -> bool {
        self.transitions.contains_key(&(from.clone(), event.clone()))
    }

    /// 执行状态转换
    pub fn transition(
        &self,
        from: &AppointmentStatus,
        event: &AppointmentEvent,
    ) -> Result<AppointmentStatus> {
        match self.transitions.get(&(from.clone(), event.clone())) {
            Some(to) => Ok(to.clone()),
            None => Err(ClinicError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<AppointmentStatus> {
        vec![
            AppointmentStatus::Pending,
            AppointmentStatus::Approved,
            AppointmentStatus::Rejected,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: &AppointmentStatus) -> Vec<AppointmentEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| state == current_state)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl Default for AppointmentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
