//! Queued Listeners Example
//!
//! Demonstrates inline, once, isolated and queued listeners on one bus.
//!
//! Run with `RUST_LOG=debug` to see lane activity.

use courier::prelude::*;
use courier::{SpawnIsolation, ThreadIsolation};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Define custom events
#[derive(Debug, Clone)]
struct OrderPlaced {
    order_id: u32,
    email: String,
}

impl Event for OrderPlaced {
    fn event_name(&self) -> &str {
        "order_placed"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// Define listeners
struct ReceiptMailer {
    attempts: AtomicU32,
}

#[async_trait]
impl Listener<OrderPlaced> for ReceiptMailer {
    async fn handle(&self, event: &OrderPlaced) -> Result<(), EventHandlerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The mail server rejects the first attempt for every order
        if attempt % 2 == 1 {
            return Err(EventHandlerError::failed(format!(
                "smtp unavailable for order {}",
                event.order_id
            )));
        }

        println!("📧 Receipt for order {} sent to {}", event.order_id, event.email);
        Ok(())
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions::new()
            .on_queue("emails")
            .with_retries(2)
            .with_timeout(Duration::from_secs(5))
    }

    fn name(&self) -> &str {
        "receipt-mailer"
    }
}

struct InventoryReserver;

#[async_trait]
impl Listener<OrderPlaced> for InventoryReserver {
    async fn handle(&self, event: &OrderPlaced) -> Result<(), EventHandlerError> {
        println!("📦 Reserved stock for order {}", event.order_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "inventory"
    }
}

struct FirstOrderCoupon;

#[async_trait]
impl Listener<OrderPlaced> for FirstOrderCoupon {
    async fn handle(&self, event: &OrderPlaced) -> Result<(), EventHandlerError> {
        println!("🎟️  First order {} earns a coupon", event.order_id);
        Ok(())
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions::new().once()
    }

    fn name(&self) -> &str {
        "first-order-coupon"
    }
}

struct FraudCheck;

#[async_trait]
impl Listener<OrderPlaced> for FraudCheck {
    async fn handle(&self, event: &OrderPlaced) -> Result<(), EventHandlerError> {
        println!(
            "🔍 Fraud check for order {} on thread {:?}",
            event.order_id,
            std::thread::current().name()
        );
        Ok(())
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions::new().isolated()
    }

    fn name(&self) -> &str {
        "fraud-check"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("\n=== Queued Listeners Example ===\n");

    // 1. Create event bus
    println!("1. Creating Event Bus:");
    let bus = EventBusBuilder::new()
        .queue(QueueConfig::new("default").with_lane("emails"))
        .isolation(ThreadIsolation::new().with_thread_name("fraud-check"))
        .build();
    println!("   ✅ Event bus created with lanes: default, emails\n");

    // 2. Register hooks
    println!("2. Registering Hooks:");
    let failures = Arc::new(AtomicU32::new(0));
    let failure_count = failures.clone();
    bus.on_error("report", move |event, error| {
        failure_count.fetch_add(1, Ordering::SeqCst);
        println!("   ⚠️  {} failed: {}", event.event_name(), error);
    });
    bus.before_handle("trace", |event, listener| {
        println!("   → {} handling {}", listener.name(), event.event_name());
    });
    println!("   ✅ on-error and before-handle hooks registered\n");

    // 3. Register listeners
    println!("3. Registering Listeners:");
    let mailer = bus.on::<OrderPlaced, _>(ReceiptMailer {
        attempts: AtomicU32::new(0),
    });
    bus.on::<OrderPlaced, _>(InventoryReserver);
    bus.on::<OrderPlaced, _>(FirstOrderCoupon);
    bus.on::<OrderPlaced, _>(FraudCheck);
    println!(
        "   Listeners for OrderPlaced: {}\n",
        bus.listener_count::<OrderPlaced>()
    );

    // 4. Fire events
    println!("4. Firing Events:");
    for order_id in 1..=2 {
        let report = bus
            .fire(OrderPlaced {
                order_id,
                email: format!("customer{order_id}@example.com"),
            })
            .await;
        println!("   Fire report: {:?}\n", report);
    }

    // 5. Drain the lanes
    println!("5. Waiting for Queued Listeners:");
    bus.wait_for_queues().await;
    println!("   📧 Mailer attempts: {}", mailer.attempts.load(Ordering::SeqCst));
    println!("   ⚠️  Reported failures: {}", failures.load(Ordering::SeqCst));
    println!(
        "   Listeners for OrderPlaced: {}\n",
        bus.listener_count::<OrderPlaced>()
    );

    // 6. Swap isolation strategy
    println!("6. Spawned Isolation:");
    let spawned = EventBusBuilder::new().isolation(SpawnIsolation).build();
    spawned.on::<OrderPlaced, _>(FraudCheck);
    spawned
        .fire(OrderPlaced {
            order_id: 3,
            email: "customer3@example.com".to_string(),
        })
        .await;
    println!();

    println!("=== Queued Listeners Example Complete ===\n");
    Ok(())
}
