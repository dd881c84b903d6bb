use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tilescape::{Admission, EntryState, FetchQueue, QueueOptions};

/// Queue behaviour observed from spawned tasks, the way tiles use it
#[cfg(test)]
mod fetch_queue_tests {
    use super::*;

    /// Never more than `size` operations run at once, and every one runs
    #[tokio::test]
    async fn test_run_respects_size() {
        let queue: FetchQueue<u32> = FetchQueue::new(QueueOptions {
            size: 3,
            ..QueueOptions::default()
        });
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for key in 0..10u32 {
            let ticket = queue.add(key, true).into_ticket().unwrap();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(ticket.run(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                }
                running.fetch_sub(1, Ordering::SeqCst);
                key
            })));
        }

        let mut finished: Vec<u32> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|result| result.unwrap().unwrap())
            .collect();
        finished.sort_unstable();
        assert_eq!(finished, (0..10).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(queue.processing(), 0);
        assert!(queue.is_empty());
    }

    /// A key submitted twice while waiting is moved, not duplicated
    #[tokio::test]
    async fn test_readd_moves_waiting_key() {
        let queue: FetchQueue<&'static str> = FetchQueue::new(QueueOptions {
            size: 1,
            ..QueueOptions::default()
        });
        let first = queue.add("a", true).into_ticket().unwrap();
        let _b = queue.add("b", true).into_ticket().unwrap();
        let _c = queue.add("c", true).into_ticket().unwrap();
        assert_eq!(queue.queued_keys(), vec!["b", "c"]);

        assert!(queue.add("c", false).into_ticket().is_none());
        assert_eq!(queue.queued_keys(), vec!["c", "b"]);
        assert_eq!(queue.state(&"a"), EntryState::Processing);

        match first.await {
            Admission::Granted(slot) => drop(slot),
            other => panic!("expected a slot, got {:?}", other),
        }
        assert_eq!(queue.state(&"a"), EntryState::Settled);
        assert_eq!(queue.state(&"c"), EntryState::Processing);
        assert_eq!(queue.queued_keys(), vec!["b"]);
    }
}
