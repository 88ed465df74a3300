//! Shared fixtures: an engine over the in-memory store, a frozen clock and
//! a gateway with a scripted outcome.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use turf_core::{
    models::{PaymentMethod, ReservationRequest, Resource},
    traits::PaymentGateway,
    AppError, AppResult, BookingConfig, FixedClock,
};
use turf_db::MemoryStore;
use turf_services::{PaymentCoordinator, RatingAggregator, ReservationEngine};

pub const TURF: i64 = 1;
pub const OWNER: i64 = 7;

pub type Engine = ReservationEngine<MemoryStore, MemoryStore, MemoryStore>;
pub type Coordinator = PaymentCoordinator<MemoryStore, MemoryStore, MemoryStore, ScriptedGateway>;
pub type Aggregator = RatingAggregator<MemoryStore, MemoryStore, MemoryStore>;

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
}

pub fn tomorrow() -> NaiveDate {
    today().succ_opt().unwrap()
}

pub fn request(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> ReservationRequest {
    ReservationRequest {
        requester_id: OWNER,
        resource_id: TURF,
        date,
        start,
        end,
        player_count: 10,
        note: Some("five-a-side".to_string()),
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub engine: Arc<Engine>,
}

/// Turf open 06:00-23:00 at 500/hour, clock at 12:00 on `today()`
pub fn harness() -> Harness {
    harness_with(BookingConfig::default())
}

pub fn harness_with(config: BookingConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.insert_resource(Resource::new(TURF, "Arena", dec!(500.00), t(6, 0), t(23, 0)));

    let clock = Arc::new(FixedClock::at(today(), t(12, 0)));
    let engine = Arc::new(ReservationEngine::new(
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&store),
        clock.clone(),
        config,
    ));

    Harness {
        store,
        clock,
        engine,
    }
}

impl Harness {
    pub fn coordinator(&self, gateway: ScriptedGateway) -> (Coordinator, Arc<ScriptedGateway>) {
        let gateway = Arc::new(gateway);
        let coordinator = PaymentCoordinator::new(Arc::clone(&self.engine), Arc::clone(&gateway));
        (coordinator, gateway)
    }

    pub fn aggregator(&self) -> Aggregator {
        RatingAggregator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.store),
            Arc::clone(&self.store),
        )
    }
}

/// What the gateway does with every attempt
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Approve,
    Decline,
    TransportError,
    Hang(Duration),
}

pub struct ScriptedGateway {
    outcome: Outcome,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn attempt(
        &self,
        _amount: Decimal,
        _method: PaymentMethod,
        _details: &str,
    ) -> AppResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Approve => Ok(true),
            Outcome::Decline => Ok(false),
            Outcome::TransportError => Err(AppError::Gateway("connection reset".to_string())),
            Outcome::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(true)
            }
        }
    }
}
