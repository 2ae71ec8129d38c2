use domain::DecodedBatch;
use std::collections::VecDeque;

/// 待处理批次的 FIFO 队列（无容量上限）。
///
/// 只允许尾部追加、头部取出；并发访问由 [`crate::Pipeline`] 的锁保护。
#[derive(Debug, Default)]
pub struct OrderedQueue {
    items: VecDeque<DecodedBatch>,
}

impl OrderedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个批次，返回入队前队列是否为空。
    pub fn enqueue(&mut self, batch: DecodedBatch) -> bool {
        let was_empty = self.items.is_empty();
        self.items.push_back(batch);
        was_empty
    }

    pub fn dequeue(&mut self) -> Option<DecodedBatch> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::LabelRecord;
    use serde_json::json;

    fn label(value: i64) -> DecodedBatch {
        DecodedBatch::Label(LabelRecord(json!(value)))
    }

    #[test]
    fn enqueue_reports_empty_edge() {
        let mut queue = OrderedQueue::new();
        assert!(queue.enqueue(label(1)));
        assert!(!queue.enqueue(label(2)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn dequeue_is_fifo() {
        let mut queue = OrderedQueue::new();
        for i in 0..3 {
            queue.enqueue(label(i));
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue())
            .map(|batch| match batch {
                DecodedBatch::Label(LabelRecord(value)) => value,
                DecodedBatch::TimeSeries(_) => json!(null),
            })
            .collect();
        assert_eq!(order, vec![json!(0), json!(1), json!(2)]);
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
    }
}
