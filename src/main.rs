// ImageStore Marketplace Client - CLI driver
// Thin rendering adapter over the session core; all marketplace logic
// lives in the library.

use std::sync::Arc;

use imagestore_client::{
    Address, CatalogIndex, ClientConfig, EnvAccountProvider, LedgerClient, SessionContext,
};

fn usage() {
    println!("Usage: imagestore-client <command>");
    println!("  list                    Browse the catalog with live prices and stock");
    println!("  buy <id>                Purchase one unit of an item");
    println!("  resell <id>             Resell one held unit of an item");
    println!("  set-price <id> <price>  Update an item's price (owner only)");
    println!("  collection              Show the items the active account owns");
    println!();
    println!("Account comes from MARKET_ACCOUNT; gateway from LEDGER_GATEWAY_URL");
    println!("(unset = in-process mock ledger).");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = ClientConfig::from_env();
    let catalog = match CatalogIndex::load(&config.catalog_path) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("❌ Catalog load failed: {}", e);
            std::process::exit(1);
        }
    };

    let ledger = Arc::new(LedgerClient::with_timeout(
        config.gateway_url.clone(),
        config.request_timeout(),
    ));

    if ledger.is_mock_mode() {
        seed_mock(&ledger, &catalog);
    }

    let session = SessionContext::new(
        catalog,
        ledger,
        Box::new(EnvAccountProvider::new()),
        config.policy(),
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("list");

    let result = match command {
        "list" => list(&session).await,
        "buy" => match parse_id(&args, 1) {
            Some(id) => buy(&session, id).await,
            None => {
                usage();
                std::process::exit(2);
            }
        },
        "resell" => match parse_id(&args, 1) {
            Some(id) => resell(&session, id).await,
            None => {
                usage();
                std::process::exit(2);
            }
        },
        "set-price" => match (parse_id(&args, 1), args.get(2).and_then(|v| v.parse().ok())) {
            (Some(id), Some(price)) => set_price(&session, id, price).await,
            _ => {
                usage();
                std::process::exit(2);
            }
        },
        "collection" => collection(&session).await,
        _ => {
            usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

fn parse_id(args: &[String], pos: usize) -> Option<u32> {
    args.get(pos).and_then(|v| v.parse().ok())
}

/// Demo inventory for mock mode; a real deployment reads the gateway
fn seed_mock(ledger: &LedgerClient, catalog: &CatalogIndex) {
    let mock = ledger.mock_handle();
    for meta in catalog.iter() {
        mock.seed_item(meta.id, 1000 * (u64::from(meta.id) + 1), 5);
    }
    if let Ok(owner) = std::env::var("MARKET_OWNER") {
        mock.set_owner(Address::new(owner));
    }
}

async fn list(session: &SessionContext) -> Result<(), Box<dyn std::error::Error>> {
    session.refresh_catalog().await?;
    println!("🖼  Catalog");
    for view in session.projections().await {
        let price = view
            .price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "…".into());
        let stock = view
            .stock
            .map(|s| s.to_string())
            .unwrap_or_else(|| "…".into());
        let affordance = view
            .eligibility
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  [{}] {:<20} price {:>8}  stock {:>3}  {}  (buyers: {})",
            view.id,
            view.name,
            price,
            stock,
            affordance,
            view.buyers.len()
        );
    }
    Ok(())
}

async fn buy(session: &SessionContext, id: u32) -> Result<(), Box<dyn std::error::Error>> {
    let receipt = session.purchase(id).await?;
    println!(
        "✅ Purchase confirmed: item {} for {} (stock now {}, you hold {})",
        receipt.item_id,
        receipt.amount_paid,
        receipt.state.stock,
        receipt.state.viewer_purchase_count
    );
    Ok(())
}

async fn resell(session: &SessionContext, id: u32) -> Result<(), Box<dyn std::error::Error>> {
    let receipt = session.resell(id).await?;
    println!(
        "✅ Resale confirmed: item {} (stock now {}, you hold {})",
        receipt.item_id, receipt.state.stock, receipt.state.viewer_purchase_count
    );
    for owned in session.owned_items()? {
        println!("   still own: {} x{}", owned.meta.name, owned.owned_count);
    }
    Ok(())
}

async fn set_price(
    session: &SessionContext,
    id: u32,
    price: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    session.refresh_item(id).await?;
    let receipt = session.update_price(id, price).await?;
    println!(
        "✅ Price updated: item {} now {}",
        receipt.item_id, receipt.new_price
    );
    Ok(())
}

async fn collection(session: &SessionContext) -> Result<(), Box<dyn std::error::Error>> {
    session.refresh_catalog().await?;
    let owned = session.owned_items()?;
    if owned.is_empty() {
        println!("No items owned by the active account.");
        return Ok(());
    }
    println!("🗂  Collection");
    for entry in owned {
        println!("  {} x{}", entry.meta.name, entry.owned_count);
        if let Some(view) = session.projection(entry.meta.id).await {
            for instant in view.history {
                println!("     bought {}", instant);
            }
        }
    }
    Ok(())
}
