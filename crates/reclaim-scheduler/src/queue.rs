//! Priority queue for pending jobs.

use reclaim_core::ids::JobId;
use reclaim_core::job::Job;
use std::collections::VecDeque;

/// Jobs waiting for a worker, in dispatch order.
///
/// Higher priorities come first; within a priority band jobs keep their
/// insertion order.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert before the first job with a strictly lower priority.
    pub fn push(&mut self, job: Job) {
        let index = self
            .jobs
            .iter()
            .position(|queued| queued.priority < job.priority)
            .unwrap_or(self.jobs.len());
        self.jobs.insert(index, job);
    }

    /// Take the next job to dispatch.
    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let index = self.position(id)?;
        self.jobs.remove(index)
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.get(id).is_some()
    }

    /// Zero-based dispatch position of a job.
    pub fn position(&self, id: JobId) -> Option<usize> {
        self.jobs.iter().position(|job| job.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reclaim_core::job::AttackConfig;

    fn job(target: &str, priority: u8) -> Job {
        Job::new(target, AttackConfig::default(), priority).unwrap()
    }

    fn order(queue: &JobQueue) -> Vec<String> {
        queue.iter().map(|job| job.target.clone()).collect()
    }

    #[test]
    fn test_priority_ordering() {
        let mut queue = JobQueue::new();
        queue.push(job("A", 9));
        queue.push(job("B", 5));
        queue.push(job("C", 9));

        assert_eq!(order(&queue), vec!["A", "C", "B"]);
        assert_eq!(queue.pop().unwrap().target, "A");
        assert_eq!(queue.pop().unwrap().target, "C");
        assert_eq!(queue.pop().unwrap().target, "B");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_band() {
        let mut queue = JobQueue::new();
        for name in ["one", "two", "three"] {
            queue.push(job(name, 5));
        }
        queue.push(job("urgent", 10));
        queue.push(job("later", 1));

        assert_eq!(order(&queue), vec!["urgent", "one", "two", "three", "later"]);
    }

    #[test]
    fn test_remove_and_position() {
        let mut queue = JobQueue::new();
        let a = job("a", 5);
        let b = job("b", 5);
        let (a_id, b_id) = (a.id, b.id);
        queue.push(a);
        queue.push(b);

        assert_eq!(queue.position(b_id), Some(1));
        assert_eq!(queue.remove(a_id).unwrap().target, "a");
        assert_eq!(queue.position(b_id), Some(0));
        assert!(queue.remove(a_id).is_none());
        assert!(!queue.contains(a_id));
        assert_eq!(queue.len(), 1);
    }
}
