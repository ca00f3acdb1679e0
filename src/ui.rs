// UI layer: the interactive menu tree built on `dialoguer`.
// Vendor, then customer, then vendor account, then an action loop for that
// account. Every action returns `anyhow::Result`; failures are printed and
// the operator lands back in the menu they came from.

use std::time::Duration;

use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};

use crate::api::ApiClient;
use crate::cache::PricingCache;
use crate::error::ApiError;
use crate::files;
use crate::models::{PriceCheck, ProductClass, Rating, Stage, Vendor, VendorAction, VendorCustomer};
use crate::pricing::{
    sort_entries, Price, PricingClass, PricingEntry, PricingMap, ProductAttr,
    PRICING_BY_CUSTOMER_ATTRS, PRODUCT_ATTRS,
};
use crate::products::{add_product, parse_model_list};

const BACK: &str = "Back";

/// Main interactive menu. Runs until the operator chooses "Exit".
///
/// `Select::interact()` is keyboard-driven: arrow keys and Enter.
pub fn main_menu(api: ApiClient) -> Result<()> {
    let mut cache = PricingCache::new();
    let vendors = with_spinner("Loading vendors...", || api.get_vendors())?;
    if vendors.is_empty() {
        println!("{}", "No vendors found".yellow());
        return Ok(());
    }

    let mut items: Vec<String> = vendors.iter().map(|v| v.name.clone()).collect();
    items.push("Exit".to_string());
    loop {
        let selection = Select::new()
            .with_prompt("Vendor")
            .items(&items)
            .default(0)
            .interact()?;
        let Some(vendor) = vendors.get(selection) else {
            break;
        };
        if let Err(e) = customer_menu(&api, &mut cache, vendor) {
            report(&e);
        }
    }
    Ok(())
}

fn customer_menu(api: &ApiClient, cache: &mut PricingCache, vendor: &Vendor) -> Result<()> {
    let groups = with_spinner("Loading customers...", || api.get_customers(vendor))?;
    let mut items: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
    items.push(BACK.to_string());

    loop {
        let selection = Select::new()
            .with_prompt(format!("{} customers", vendor.name))
            .items(&items)
            .default(0)
            .interact()?;
        let Some(group) = groups.get(selection) else {
            return Ok(());
        };
        if group.accounts.is_empty() {
            println!("{}", format!("{} has no {} accounts", group.name, vendor.name).yellow());
            continue;
        }

        let mut accounts: Vec<String> = group.accounts.iter().map(|a| a.name.clone()).collect();
        accounts.push(BACK.to_string());
        let selection = Select::new()
            .with_prompt(format!("{} accounts", group.name))
            .items(&accounts)
            .default(0)
            .interact()?;
        if let Some(account) = group.accounts.get(selection) {
            action_menu(api, cache, account)?;
        }
    }
}

fn action_menu(api: &ApiClient, cache: &mut PricingCache, account: &VendorCustomer) -> Result<()> {
    let mut items: Vec<String> = VendorAction::ALL.iter().map(ToString::to_string).collect();
    items.push(BACK.to_string());

    loop {
        let selection = Select::new()
            .with_prompt(&account.name)
            .items(&items)
            .default(0)
            .interact()?;
        let Some(&action) = VendorAction::ALL.get(selection) else {
            return Ok(());
        };
        tracing::debug!(%action, customer = %account.id, "running action");

        let outcome = match action {
            VendorAction::DownloadProgram => download_program(api, account),
            VendorAction::UploadRatings => upload_ratings(api, account),
            VendorAction::ReviewRatings => review_ratings(api, account),
            VendorAction::ViewProducts(class) => view_products(api, cache, account, class),
            VendorAction::AddProducts(class) => add_products(api, cache, account, class),
            VendorAction::PriceCheck => price_check(api, account),
            VendorAction::ZeroDiscountList => zero_discount_list(api, &account.vendor),
        };
        if let Err(e) = outcome {
            report(&e);
        }
    }
}

fn download_program(api: &ApiClient, account: &VendorCustomer) -> Result<()> {
    let include_proposed = Confirm::new()
        .with_prompt("Include proposed line items?")
        .default(false)
        .interact()?;
    let stage = if include_proposed {
        Stage::Proposed
    } else {
        Stage::Active
    };
    let dir = files::save_dir();
    let result = with_spinner(&format!("Downloading {stage} program..."), || {
        api.download_program(account, stage, &dir)
    });
    match result {
        Ok(path) => success(&format!("Saved {}", path.display())),
        Err(ApiError::FileSave { filename, .. }) => println!(
            "{}",
            format!(
                "Unable to save {}. Close the file if it is open and try again.",
                filename.display()
            )
            .red()
        ),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn upload_ratings(api: &ApiClient, account: &VendorCustomer) -> Result<()> {
    let file = files::select_file()?;
    with_spinner("Uploading ratings...", || api.upload_ratings(account, &file))?;
    success("Ratings uploaded");
    Ok(())
}

fn review_ratings(api: &ApiClient, account: &VendorCustomer) -> Result<()> {
    loop {
        let ratings = with_spinner("Loading ratings...", || api.get_ratings(account))?;
        println!("{}", rating_header().bold());
        for rating in &ratings {
            println!("{}", rating_row(rating));
        }

        let delete = Confirm::new()
            .with_prompt("Delete a rating?")
            .default(false)
            .interact()?;
        if !delete {
            return Ok(());
        }
        let mut items: Vec<String> = ratings.iter().map(rating_row).collect();
        items.push(BACK.to_string());
        let selection = Select::new().items(&items).default(0).interact()?;
        let Some(rating) = ratings.get(selection) else {
            return Ok(());
        };
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete rating {}?", rating.id))
            .default(false)
            .interact()?;
        if confirmed {
            api.delete_rating(account, &rating.id)?;
            success("Rating deleted");
        }
    }
}

fn view_products(
    api: &ApiClient,
    cache: &mut PricingCache,
    account: &VendorCustomer,
    class: ProductClass,
) -> Result<()> {
    loop {
        let entries: Vec<PricingEntry> = {
            let pricing = cache.get_or_try_insert_with(class, &account.id, || {
                with_spinner(&format!("Loading {}...", class.label()), || {
                    api.get_pricing(class, account)
                })
            })?;
            sort_entries(pricing).into_iter().map(|(_, e)| e.clone()).collect()
        };

        let mut items: Vec<String> = entries.iter().map(entry_row).collect();
        items.push(BACK.to_string());
        let selection = Select::new()
            .with_prompt(format!("{} for {}", class.wire_name(), account.name))
            .items(&items)
            .default(0)
            .interact()?;
        let Some(entry) = entries.get(selection) else {
            return Ok(());
        };
        edit_entry(api, cache, account, entry)?;
    }
}

/// Show one product and let the operator change one of its attributes.
fn edit_entry(
    api: &ApiClient,
    cache: &mut PricingCache,
    account: &VendorCustomer,
    entry: &PricingEntry,
) -> Result<()> {
    println!("{} {}", entry.model_number.clone().bold(), entry.description);
    println!("Price: {}", Price(entry.price));
    if let Some(date) = &entry.effective_date {
        println!("Effective: {date}");
    }

    let attrs: Vec<(bool, &String, &ProductAttr)> = entry
        .customer_attrs
        .iter()
        .map(|(name, attr)| (true, name, attr))
        .chain(entry.attrs.iter().map(|(name, attr)| (false, name, attr)))
        .collect();
    let mut items: Vec<String> = attrs
        .iter()
        .map(|(_, name, attr)| format!("{name}: {}", attr.value))
        .collect();
    items.push(BACK.to_string());

    let selection = Select::new()
        .with_prompt("Edit attribute")
        .items(&items)
        .default(0)
        .interact()?;
    let Some(&(is_customer_attr, name, attr)) = attrs.get(selection) else {
        return Ok(());
    };

    let value: String = Input::new()
        .with_prompt(format!("New value for {name}"))
        .with_initial_text(attr.value.clone())
        .interact_text()?;
    if value == attr.value {
        return Ok(());
    }
    let kind = if is_customer_attr {
        api.update_customer_attr(&attr.id, &value)?;
        PRICING_BY_CUSTOMER_ATTRS
    } else {
        api.update_product_attr(&attr.id, &value)?;
        PRODUCT_ATTRS
    };
    cache.update_attr_value(&account.id, kind, &attr.id, &value);
    success(&format!("{name} updated"));
    Ok(())
}

fn add_products(
    api: &ApiClient,
    cache: &mut PricingCache,
    account: &VendorCustomer,
    class: ProductClass,
) -> Result<()> {
    let input: String = Input::new()
        .with_prompt(format!("Model numbers of {} (comma separated)", class.label()))
        .allow_empty(true)
        .interact_text()?;
    let models = parse_model_list(&input);
    if models.is_empty() {
        return Ok(());
    }

    for model in &models {
        let result = with_spinner(&format!("Adding {model}..."), || {
            add_product(api, account, model, class)
        });
        match result {
            Ok(created) => success(&format!(
                "Added {} ({}) as pricing {}",
                created.model_number, created.description, created.pricing_id
            )),
            Err(e) => report(&anyhow::Error::new(e).context(format!("Adding {model} failed"))),
        }
    }
    cache.invalidate_customer(&account.id);
    Ok(())
}

fn price_check(api: &ApiClient, account: &VendorCustomer) -> Result<()> {
    let model: String = Input::new().with_prompt("Model number").interact_text()?;
    let model = model.trim().to_uppercase();
    let check = with_spinner("Checking price...", || api.price_check(account, &model))?;
    print_price_check(&model, &check);
    Ok(())
}

fn print_price_check(model: &str, check: &PriceCheck) {
    println!("{}", model.bold());
    println!("Zero discount price: ${:.2}", check.zero_discount_price);
    println!("Net price:           ${:.2}", check.net_price);
    println!("Discount used:       {:.2}%", check.discount_used());
    for (name, value) in check.features() {
        println!("  {name}: {value}");
    }
}

fn zero_discount_list(api: &ApiClient, vendor: &Vendor) -> Result<()> {
    let pricing = with_spinner("Loading zero discount prices...", || {
        api.get_zero_discount_pricing(vendor)
    })?;
    println!("{}", format!("{} {}", vendor.name, PricingClass::ZeroDiscount.label()).bold());
    print_pricing(&pricing);
    Ok(())
}

fn print_pricing(pricing: &PricingMap) {
    for (_, entry) in sort_entries(pricing) {
        println!("{}", entry_row(entry));
    }
}

fn entry_row(entry: &PricingEntry) -> String {
    format!(
        "{:<24} {:<32} {:>12}  {}",
        entry.model_number,
        entry.description,
        Price(entry.price).to_string(),
        entry.custom_description().unwrap_or("")
    )
}

fn rating_header() -> String {
    format!(
        "{:<12} {:<20} {:<20} {:<16} {:>6} {:>6} {:>9} {:>6}",
        "AHRI", "Outdoor", "Indoor", "OEM", "SEER2", "EER2", "Capacity", "HSPF2"
    )
}

fn rating_row(rating: &Rating) -> String {
    let a = &rating.attributes;
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let num = |v: Option<f64>| v.map(|n| format!("{n:.1}")).unwrap_or_default();
    format!(
        "{:<12} {:<20} {:<20} {:<16} {:>6} {:>6} {:>9} {:>6}",
        text(&a.ahrinumber),
        text(&a.outdoor_model),
        text(&a.indoor_model),
        text(&a.oem_name),
        num(a.seer2),
        num(a.eer2),
        num(a.capacity2),
        num(a.hspf2)
    )
}

/// Run `work` behind an indicatif spinner.
fn with_spinner<T>(message: &str, work: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let out = work();
    spinner.finish_and_clear();
    out
}

fn success(message: &str) {
    println!("{}", message.green());
}

/// Print a failed action. Empty results are not failures.
fn report(err: &anyhow::Error) {
    tracing::debug!(error = ?err, "action failed");
    match err.downcast_ref::<ApiError>() {
        Some(e) if e.is_empty() => println!("{}", e.to_string().yellow()),
        _ => println!("{}", format!("{err:#}").red()),
    }
}
