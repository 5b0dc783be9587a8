use std::sync::{Arc, Mutex, MutexGuard};

/// 单槽 CSR 通道。
///
/// 两次 `offer` 之间若协调器没有 `take`，先前的 CSR 被覆盖；
/// 生产者不能假设在下一轮 VPN 检查之前 CSR 已被取走。
#[derive(Debug, Clone, Default)]
pub struct CsrSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl CsrSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入 CSR；返回被覆盖的旧值。
    pub fn offer(&self, csr: impl Into<String>) -> Option<String> {
        self.slot().replace(csr.into())
    }

    pub fn take(&self) -> Option<String> {
        self.slot().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_offer_overwrites_undrained_csr() {
        let slot = CsrSlot::new();
        assert!(slot.offer("first").is_none());
        assert_eq!(slot.offer("second").as_deref(), Some("first"));
        assert_eq!(slot.take().as_deref(), Some("second"));
        assert!(slot.take().is_none());
    }

    #[test]
    fn clones_share_the_slot() {
        let producer = CsrSlot::new();
        let consumer = producer.clone();
        producer.offer("csr");
        assert!(!consumer.is_empty());
        assert_eq!(consumer.take().as_deref(), Some("csr"));
        assert!(producer.is_empty());
    }
}
