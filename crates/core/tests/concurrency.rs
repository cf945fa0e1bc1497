//! Concurrent callers racing for the same inventory

use std::sync::{Arc, Barrier};
use std::thread;

use boxoffice_core::{
    BoxOffice, Clock, Database, Error, Hold, HoldStatus, ManualClock, NewEvent, NewSeat,
    ReservationConfig, Result, SeatSelection,
};
use chrono::{Duration, SubsecRound, Utc};
use uuid::Uuid;

fn office() -> (BoxOffice, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(6)));
    let office = BoxOffice::with_clock(
        Database::open_in_memory().unwrap(),
        ReservationConfig::default(),
        clock.clone(),
    )
    .unwrap();
    (office, clock)
}

/// Run `n` calls of `f` released together from a barrier
fn race<T: Send>(n: usize, f: impl Fn(usize) -> T + Sync) -> Vec<T> {
    let barrier = Barrier::new(n);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let barrier = &barrier;
                let f = &f;
                scope.spawn(move || {
                    barrier.wait();
                    f(i)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn two_seats_two_buyers_then_a_loser() {
    let (office, clock) = office();
    let catalog = office.catalog();
    let event = catalog
        .create_event(NewEvent::seated(
            "Chamber Night",
            clock.now() + Duration::days(3),
            2,
            4000,
        ))
        .unwrap();
    let seat_a = catalog
        .add_seat(event.id, NewSeat::new("Main", "A", 1).with_multiplier(1.25))
        .unwrap();
    let seat_b = catalog
        .add_seat(event.id, NewSeat::new("Main", "A", 2))
        .unwrap();

    let users = [Uuid::new_v4(), Uuid::new_v4()];
    let picks = [seat_a.id, seat_b.id];
    let results = race(2, |i| {
        office
            .holds()
            .create_hold(event.id, users[i], SeatSelection::Seats(vec![picks[i]]))
    });
    let holds: Vec<Hold> = results.into_iter().map(|r| r.unwrap()).collect();

    let err = office
        .holds()
        .create_hold(event.id, Uuid::new_v4(), SeatSelection::Seats(vec![seat_a.id]))
        .unwrap_err();
    assert!(matches!(err, Error::SeatUnavailable(id) if id == seat_a.id));

    let tickets = office.holds().confirm_hold(holds[0].id).unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].admission.seat_id(), Some(seat_a.id));
    assert_eq!(tickets[0].price, 5000);
    assert_eq!(tickets[0].user_id, users[0]);
}

#[test]
fn many_buyers_one_seat() {
    let (office, clock) = office();
    let event = office
        .catalog()
        .create_event(NewEvent::seated(
            "Solo Recital",
            clock.now() + Duration::days(3),
            1,
            9000,
        ))
        .unwrap();
    let seat = office
        .catalog()
        .add_seat(event.id, NewSeat::new("Front", "A", 1))
        .unwrap();

    let results = race(16, |_| {
        office
            .holds()
            .create_hold(event.id, Uuid::new_v4(), SeatSelection::Seats(vec![seat.id]))
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, Error::SeatUnavailable(_)));
        }
    }
    assert!(office.audit(event.id).unwrap().is_consistent());
}

#[test]
fn last_general_admission_goes_to_one_buyer() {
    let (office, clock) = office();
    let event = office
        .catalog()
        .create_event(NewEvent::general(
            "Rooftop",
            clock.now() + Duration::days(1),
            1,
            1500,
        ))
        .unwrap();

    let results = race(2, |_| {
        office
            .holds()
            .create_hold(event.id, Uuid::new_v4(), SeatSelection::Quantity(1))
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(Error::CapacityExceeded {
            requested: 1,
            remaining: 0
        })
    )));
}

#[test]
fn concurrent_buy_flows_never_oversell() {
    let (office, clock) = office();
    let event = office
        .catalog()
        .create_event(NewEvent::general(
            "Festival",
            clock.now() + Duration::days(1),
            10,
            2000,
        ))
        .unwrap();

    let results: Vec<Result<usize>> = race(24, |i| {
        let holds = office.holds();
        let quantity = (i % 3) as u32 + 1;
        let hold = holds.create_hold(event.id, Uuid::new_v4(), SeatSelection::Quantity(quantity))?;
        if i % 4 == 0 {
            holds.release_hold(hold.id)?;
            return Ok(0);
        }
        Ok(holds.confirm_hold(hold.id)?.len())
    });

    let sold: usize = results.iter().filter_map(|r| r.as_ref().ok()).sum();
    for result in &results {
        if let Err(err) = result {
            assert!(err.is_contention(), "unexpected error: {}", err);
        }
    }

    let audit = office.audit(event.id).unwrap();
    assert!(audit.is_consistent(), "{:?}", audit.violations());
    assert_eq!(audit.sold as usize, sold);
    assert_eq!(audit.held, 0);
    assert!(audit.sold <= 10);
}

#[test]
fn confirm_and_release_race_has_one_outcome() {
    let (office, clock) = office();
    let event = office
        .catalog()
        .create_event(NewEvent::general(
            "Lecture",
            clock.now() + Duration::days(1),
            50,
            0,
        ))
        .unwrap();

    for _ in 0..10 {
        let hold = office
            .holds()
            .create_hold(event.id, Uuid::new_v4(), SeatSelection::Quantity(1))
            .unwrap();

        let outcomes = race(2, |i| {
            if i == 0 {
                office.holds().confirm_hold(hold.id).map(|_| ())
            } else {
                office.holds().release_hold(hold.id).map(|_| ())
            }
        });

        let status = office.holds().hold(hold.id).unwrap().status;
        match status {
            HoldStatus::Confirmed => assert!(outcomes[0].is_ok()),
            HoldStatus::Released(_) => assert!(matches!(
                outcomes[0],
                Err(Error::AlreadyFinalized { .. })
            )),
            HoldStatus::Active => panic!("hold left active"),
        }
        // Release never fails on a finished hold
        assert!(outcomes[1].is_ok());
    }

    let audit = office.audit(event.id).unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.held, 0);
}

#[test]
fn confirm_racing_the_sweeper_after_deadline() {
    let (office, clock) = office();
    let event = office
        .catalog()
        .create_event(NewEvent::general(
            "Workshop",
            clock.now() + Duration::days(1),
            5,
            100,
        ))
        .unwrap();
    let hold = office
        .holds()
        .create_hold(event.id, Uuid::new_v4(), SeatSelection::Quantity(2))
        .unwrap();
    clock.advance(Duration::minutes(10));

    let outcomes = race(2, |i| {
        if i == 0 {
            office.holds().confirm_hold(hold.id).map(|_| 0)
        } else {
            office.holds().sweep_expired()
        }
    });

    // Whoever went first released it; confirm can only observe that
    assert!(matches!(
        outcomes[0],
        Err(Error::Expired(_)) | Err(Error::AlreadyFinalized { .. })
    ));
    assert!(outcomes[1].is_ok());
    assert!(office.holds().hold(hold.id).unwrap().status.is_terminal());
    assert_eq!(office.holds().availability(event.id).unwrap().remaining(), 5);
}
