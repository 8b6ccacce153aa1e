use std::sync::{Arc, Once};

use duka_client::notify::{BufferNotifier, Notifier};
use duka_client::persist::MemorySnapshotStore;
use duka_client::StorefrontClient;
use duka_common::cart::CartItem;
use duka_common::checkout::ShippingAddress;
use duka_common::money::Money;

pub mod harness;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// A client wired to in-memory persistence and a buffering notifier, so
/// tests can assert on user-facing messages.
pub fn test_client(base_url: &str) -> (StorefrontClient, Arc<BufferNotifier>) {
    let notifier = Arc::new(BufferNotifier::new());
    let sink: Arc<dyn Notifier> = notifier.clone();
    let client = StorefrontClient::new(base_url, Arc::new(MemorySnapshotStore::new()), sink);
    (client, notifier)
}

/// A local cart item priced to match the seeded catalog.
pub fn catalog_item(product_id: u64, name: &str, price_major: i64, quantity: u32) -> CartItem {
    CartItem {
        product_id,
        color_id: None,
        name: name.to_string(),
        quantity,
        unit_price: Money::from_major(price_major),
        max_quantity: None,
    }
}

pub fn valid_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Amina Odhiambo".into(),
        phone: "+254712345678".into(),
        email: "amina@example.com".into(),
        street: "14 Riverside Drive".into(),
        city: "Nairobi".into(),
        province: "Nairobi".into(),
        postal_code: "00100".into(),
    }
}
