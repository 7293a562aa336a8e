//! 支付状态机
//!
//! 管理支付记录从创建到结算、退款的状态转换。
//! 退款申请被管理员驳回时状态精确回到 Paid。

use clinic_core::{ClinicError, PaymentStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 支付状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentEvent {
    Settled,        // 网关结算成功或医生确认到店支付
    Failed,         // 结算失败
    Cancelled,      // 取消支付
    RefundRequested, // 患者申请退款
    RefundApproved, // 管理员批准退款
    RefundRejected, // 管理员驳回退款
}

/// 支付状态机
#[derive(Debug)]
pub struct PaymentStateMachine {
    transitions: HashMap<(PaymentStatus, PaymentEvent), PaymentStatus>,
}

impl PaymentStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert(
            (PaymentStatus::Pending, PaymentEvent::Settled),
            PaymentStatus::Paid,
        );
        transitions.insert(
            (PaymentStatus::Pending, PaymentEvent::Failed),
            PaymentStatus::Failed,
        );
        transitions.insert(
            (PaymentStatus::Pending, PaymentEvent::Cancelled),
            PaymentStatus::Cancelled,
        );
        transitions.insert(
            (PaymentStatus::Paid, PaymentEvent::Cancelled),
            PaymentStatus::Cancelled,
        );
        transitions.insert(
            (PaymentStatus::Paid, PaymentEvent::RefundRequested),
            PaymentStatus::RefundRequested,
        );
        transitions.insert(
            (PaymentStatus::RefundRequested, PaymentEvent::RefundApproved),
            PaymentStatus::Refunded,
        );
        transitions.insert(
            (PaymentStatus::RefundRequested, PaymentEvent::RefundRejected),
            PaymentStatus::Paid,
        );

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &PaymentStatus, event: &PaymentEvent) -> bool {
        self.transitions.contains_key(&(from.clone(), event.clone()))
    }

    /// 执行状态转换
    pub fn transition(&self, from: &PaymentStatus, event: &PaymentEvent) -> Result<PaymentStatus> {
        match self.transitions.get(&(from.clone(), event.clone())) {
            Some(to) => Ok(to.clone()),
            None => Err(ClinicError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<PaymentStatus> {
        vec![
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::RefundRequested,
            PaymentStatus::Refunded,
            PaymentStatus::Cancelled,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: &PaymentStatus) -> Vec<PaymentEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| state == current_state)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl Default for PaymentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = PaymentStateMachine::new();

        assert!(sm.can_transition(&PaymentStatus::Pending, &PaymentEvent::Settled));
        assert!(sm.can_transition(&PaymentStatus::Paid, &PaymentEvent::RefundRequested));
        assert!(sm.can_transition(&PaymentStatus::RefundRequested, &PaymentEvent::RefundApproved));
    }

    #[test]
    fn test_refund_only_reachable_from_paid() {
        let sm = PaymentStateMachine::new();

        // Pending 和 Refunded 都不允许进入退款申请
        assert!(!sm.can_transition(&PaymentStatus::Pending, &PaymentEvent::RefundRequested));
        assert!(!sm.can_transition(&PaymentStatus::Refunded, &PaymentEvent::RefundRequested));
    }

    #[test]
    fn test_refund_rejection_returns_to_paid() {
        let sm = PaymentStateMachine::new();

        let result = sm.transition(&PaymentStatus::RefundRequested, &PaymentEvent::RefundRejected);
        assert_eq!(result.unwrap(), PaymentStatus::Paid);
    }

    #[test]
    fn test_terminal_states_have_no_events() {
        let sm = PaymentStateMachine::new();

        for status in PaymentStateMachine::get_all_states() {
            if status.is_terminal() {
                assert!(sm.get_possible_events(&status).is_empty());
            }
        }
    }

    #[test]
    fn test_state_execution() {
        let sm = PaymentStateMachine::new();

        let result = sm.transition(&PaymentStatus::Pending, &PaymentEvent::Settled);
        assert_eq!(result.unwrap(), PaymentStatus::Paid);

        let result = sm.transition(&PaymentStatus::Failed, &PaymentEvent::Settled);
        assert!(result.is_err());
    }
}
