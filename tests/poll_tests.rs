//! Poll waiter behavior across threads

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use orbit::{Manager, PollEvents, PollWaiter, TopicMeta};

#[test]
fn test_poll_not_ready_without_data() {
    let bus = Manager::new();
    let meta = TopicMeta::new("tick", 4);
    let _advert = bus.advertise(&meta, &[0u8; 4], 1).unwrap();
    let sub = bus.subscribe(&meta).unwrap();

    let waiter = Arc::new(PollWaiter::new(PollEvents::READABLE));
    bus.poll(sub, &waiter, true).unwrap();
    assert!(waiter.revents().is_empty());
    assert!(waiter.wait(Some(Duration::from_millis(5))).is_empty());
    bus.poll(sub, &waiter, false).unwrap();
}

#[test]
fn test_poll_immediately_ready_when_data_pending() {
    let bus = Manager::new();
    let meta = TopicMeta::new("tick", 4);
    let advert = bus.advertise(&meta, &[0u8; 4], 1).unwrap();
    let sub = bus.subscribe(&meta).unwrap();

    bus.publish(&meta, &advert, &[1u8; 4]).unwrap();

    let waiter = Arc::new(PollWaiter::new(PollEvents::READABLE));
    bus.poll(sub, &waiter, true).unwrap();
    assert_eq!(waiter.revents(), PollEvents::READABLE);
    bus.poll(sub, &waiter, false).unwrap();
}

#[test]
fn test_publish_wakes_blocked_waiter() {
    let _ = env_logger::builder().is_test(true).try_init();

    let bus = Arc::new(Manager::new());
    let meta = TopicMeta::new("gyro", 8);
    let advert = bus.advertise(&meta, &[0u8; 8], 1).unwrap();
    let sub = bus.subscribe(&meta).unwrap();

    let waiter = Arc::new(PollWaiter::new(PollEvents::READABLE));
    bus.poll(sub, &waiter, true).unwrap();
    assert!(waiter.revents().is_empty());

    let publisher_bus = Arc::clone(&bus);
    let publisher_meta = meta.clone();
    let publisher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        publisher_bus
            .publish(&publisher_meta, &advert, &[7u8; 8])
            .unwrap();
    });

    let events = waiter.wait(Some(Duration::from_secs(5)));
    assert_eq!(events, PollEvents::READABLE);
    publisher.join().unwrap();

    bus.poll(sub, &waiter, false).unwrap();

    let mut buf = [0u8; 8];
    bus.copy(&meta, sub, &mut buf).unwrap();
    assert_eq!(buf, [7u8; 8]);
}

#[test]
fn test_waiter_rearms_after_copy() {
    let bus = Manager::new();
    let meta = TopicMeta::new("mag", 2);
    let advert = bus.advertise(&meta, &[0u8; 2], 1).unwrap();
    let sub = bus.subscribe(&meta).unwrap();

    let waiter = Arc::new(PollWaiter::new(PollEvents::READABLE));

    // round one: publish signals the registration exactly once
    bus.poll(sub, &waiter, true).unwrap();
    bus.publish(&meta, &advert, &[1u8; 2]).unwrap();
    assert_eq!(
        waiter.wait(Some(Duration::from_secs(1))),
        PollEvents::READABLE
    );
    bus.poll(sub, &waiter, false).unwrap();

    let mut buf = [0u8; 2];
    bus.copy(&meta, sub, &mut buf).unwrap();

    // round two: after the copy, re-polling is quiet until the next publish
    bus.poll(sub, &waiter, true).unwrap();
    assert!(waiter.revents().is_empty());
    assert!(waiter.wait(Some(Duration::from_millis(5))).is_empty());

    bus.publish(&meta, &advert, &[2u8; 2]).unwrap();
    assert_eq!(
        waiter.wait(Some(Duration::from_secs(1))),
        PollEvents::READABLE
    );
    bus.poll(sub, &waiter, false).unwrap();
}

#[test]
fn test_torn_down_waiter_is_not_signaled() {
    let bus = Manager::new();
    let meta = TopicMeta::new("airspeed", 4);
    let advert = bus.advertise(&meta, &[0u8; 4], 1).unwrap();
    let sub = bus.subscribe(&meta).unwrap();

    let waiter = Arc::new(PollWaiter::new(PollEvents::READABLE));
    bus.poll(sub, &waiter, true).unwrap();
    bus.poll(sub, &waiter, false).unwrap();

    bus.publish(&meta, &advert, &[1u8; 4]).unwrap();
    assert!(waiter.revents().is_empty());
}

#[test]
fn test_many_waiters_on_one_node() {
    let bus = Arc::new(Manager::new());
    let meta = TopicMeta::new("battery_status", 4);
    let advert = bus.advertise(&meta, &[0u8; 4], 1).unwrap();

    let mut subs = Vec::new();
    let mut waiters = Vec::new();
    for _ in 0..12 {
        let sub = bus.subscribe(&meta).unwrap();
        let waiter = Arc::new(PollWaiter::new(PollEvents::READABLE));
        bus.poll(sub, &waiter, true).unwrap();
        subs.push(sub);
        waiters.push(waiter);
    }

    bus.publish(&meta, &advert, &[9u8; 4]).unwrap();

    for (sub, waiter) in subs.iter().zip(&waiters) {
        assert_eq!(
            waiter.wait(Some(Duration::from_secs(1))),
            PollEvents::READABLE
        );
        bus.poll(*sub, waiter, false).unwrap();

        let mut buf = [0u8; 4];
        bus.copy(&meta, *sub, &mut buf).unwrap();
        assert_eq!(buf, [9u8; 4]);
    }
}

#[test]
fn test_concurrent_subscribers_each_see_the_stream() {
    let bus = Arc::new(Manager::new());
    let meta = TopicMeta::new("position", 8);
    let advert = bus.advertise(&meta, &0u64.to_le_bytes(), 4).unwrap();

    let mut readers = Vec::new();
    for _ in 0..4 {
        let bus = Arc::clone(&bus);
        let meta = meta.clone();
        let sub = bus.subscribe(&meta).unwrap();

        readers.push(thread::spawn(move || {
            let waiter = Arc::new(PollWaiter::new(PollEvents::READABLE));
            let mut last = 0u64;
            let mut buf = [0u8; 8];

            while last < 50 {
                bus.poll(sub, &waiter, true).unwrap();
                waiter.wait(Some(Duration::from_secs(5)));
                bus.poll(sub, &waiter, false).unwrap();

                while let Ok(report) = bus.copy(&meta, sub, &mut buf) {
                    let value = u64::from_le_bytes(buf);
                    // in-order delivery with gaps only from ring overwrites
                    assert!(value > last);
                    assert!(report.generation > 0);
                    last = value;
                }
            }
            last
        }));
    }

    for v in 1..=50u64 {
        bus.publish(&meta, &advert, &v.to_le_bytes()).unwrap();
        if v % 10 == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }

    for reader in readers {
        assert_eq!(reader.join().unwrap(), 50);
    }
}
