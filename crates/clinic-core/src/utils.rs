//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 生成唯一交易号
pub fn generate_transaction_id() -> String {
    format!(
        "TXN-{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// 生成唯一发票号
pub fn generate_invoice_number() -> String {
    format!(
        "INV-{}-{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().simple().to_string()[..12]
    )
}

/// 验证交易号格式
pub fn is_valid_transaction_id(id: &str) -> bool {
    let mut parts = id.splitn(3, '-');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some("TXN"), Some(ts), Some(tail))
            if ts.chars().all(|c| c.is_ascii_digit()) && !tail.is_empty()
    )
}

/// 验证发票号格式
pub fn is_valid_invoice_number(number: &str) -> bool {
    let mut parts = number.splitn(3, '-');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some("INV"), Some(date), Some(tail))
            if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) && !tail.is_empty()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_transaction_id() {
        let id = generate_transaction_id();
        assert!(is_valid_transaction_id(&id));
    }

    #[test]
    fn test_generate_invoice_number() {
        let number = generate_invoice_number();
        assert!(is_valid_invoice_number(&number));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_transaction_id();
        let b = generate_transaction_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_formats() {
        assert!(!is_valid_transaction_id(""));
        assert!(!is_valid_transaction_id("INV-20250301-abc"));
        assert!(!is_valid_invoice_number("TXN-123-abc"));
    }
}
