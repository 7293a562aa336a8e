//! 支付统计聚合
//!
//! 管理员只读视图：按状态和支付方式分组的计数与金额汇总

use clinic_core::{Payment, PaymentStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 支付统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatistics {
    pub total_payments: usize,
    pub count_by_status: HashMap<String, usize>,
    pub count_by_method: HashMap<String, usize>,
    pub amount_by_method: HashMap<String, i64>,
    pub paid_total: i64,
    pub refunded_total: i64,
    pub net_revenue: i64,
}

impl PaymentStatistics {
    /// 对支付记录做一次分组归并
    pub fn compute(payments: &[Payment]) -> Self {
        let mut count_by_status: HashMap<String, usize> = HashMap::new();
        let mut count_by_method: HashMap<String, usize> = HashMap::new();
        let mut amount_by_method: HashMap<String, i64> = HashMap::new();
        let mut paid_total = 0i64;
        let mut refunded_total = 0i64;

        for payment in payments {
            *count_by_status
                .entry(format!("{:?}", payment.status).to_lowercase())
                .or_insert(0) += 1;
            *count_by_method
                .entry(payment.payment_method.as_str().to_string())
                .or_insert(0) += 1;

            match payment.status {
                // 仅结算完成的支付计入营收；退款申请中的金额悬置，
                // 待裁决后回到 Paid 或进入 Refunded
                PaymentStatus::Paid => {
                    paid_total += payment.amount;
                    *amount_by_method
                        .entry(payment.payment_method.as_str().to_string())
                        .or_insert(0) += payment.amount;
                }
                PaymentStatus::Refunded => {
                    refunded_total += payment.refund_amount.unwrap_or(payment.amount);
                }
                _ => {}
            }
        }

        Self {
            total_payments: payments.len(),
            count_by_status,
            count_by_method,
            amount_by_method,
            paid_total,
            refunded_total,
            net_revenue: paid_total - refunded_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::{utils, PaymentMethod};
    use uuid::Uuid;

    fn payment(status: PaymentStatus, method: PaymentMethod, amount: i64) -> Payment {
        let now = chrono::Utc::now();
        Payment {
            id: Uuid::new_v4(),
            transaction_id: utils::generate_transaction_id(),
            invoice_number: utils::generate_invoice_number(),
            appointment_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            amount,
            payment_method: method,
            refund_amount: match status {
                PaymentStatus::Refunded => Some(amount),
                _ => None,
            },
            status,
            phone_number: None,
            card_last_digits: None,
            refund_reason: None,
            refund_notes: None,
            refund_requested_at: None,
            refund_processed_at: None,
            transaction_date: now,
            created_at: now,
        }
    }

    #[test]
    fn test_net_revenue() {
        // 2 笔已支付共 5000，1 笔已退款共 1500
        let payments = vec![
            payment(PaymentStatus::Paid, PaymentMethod::CreditCard, 2000),
            payment(PaymentStatus::Paid, PaymentMethod::JazzCash, 3000),
            payment(PaymentStatus::Refunded, PaymentMethod::CreditCard, 1500),
            payment(PaymentStatus::Pending, PaymentMethod::ClinicVisit, 800),
        ];

        let stats = PaymentStatistics::compute(&payments);
        assert_eq!(stats.paid_total, 5000);
        assert_eq!(stats.refunded_total, 1500);
        assert_eq!(stats.net_revenue, 3500);
        // total_payments 统计所有状态的记录
        assert_eq!(stats.total_payments, 4);
    }

    #[test]
    fn test_refund_requested_amount_is_held_out_of_revenue() {
        let payments = vec![
            payment(PaymentStatus::Paid, PaymentMethod::CreditCard, 2000),
            payment(PaymentStatus::Refunded, PaymentMethod::CreditCard, 500),
            payment(PaymentStatus::RefundRequested, PaymentMethod::JazzCash, 700),
        ];

        let stats = PaymentStatistics::compute(&payments);
        assert_eq!(stats.paid_total, 2000);
        assert_eq!(stats.refunded_total, 500);
        assert_eq!(stats.net_revenue, 1500);
    }

    #[test]
    fn test_group_counts() {
        let payments = vec![
            payment(PaymentStatus::Paid, PaymentMethod::CreditCard, 2000),
            payment(PaymentStatus::Paid, PaymentMethod::CreditCard, 1000),
            payment(PaymentStatus::Failed, PaymentMethod::Easypaisa, 500),
        ];

        let stats = PaymentStatistics::compute(&payments);
        assert_eq!(stats.count_by_status.get("paid"), Some(&2));
        assert_eq!(stats.count_by_status.get("failed"), Some(&1));
        assert_eq!(stats.count_by_method.get("credit_card"), Some(&2));
        assert_eq!(stats.amount_by_method.get("credit_card"), Some(&3000));
    }

    #[test]
    fn test_empty_input() {
        let stats = PaymentStatistics::compute(&[]);
        assert_eq!(stats.total_payments, 0);
        assert_eq!(stats.net_revenue, 0);
    }
}
