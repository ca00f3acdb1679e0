// API client module: a blocking HTTP session against the vendor-pricing
// backend. The session owns the current bearer header; every request goes
// through `send`, which refreshes the token and retries once on a 401.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::{Certificate, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{request_token, TokenStore};
use crate::config::{AppConfig, OAuthConfig, TlsVerify};
use crate::customers::group_customers;
use crate::error::ApiError;
use crate::files;
use crate::jsonapi::{resolve, Document};
use crate::models::{CustomerGroup, PriceCheck, ProductClass, Rating, Stage, Vendor, VendorCustomer};
use crate::pricing::{
    reconstruct_by_class, reconstruct_by_customer, PricingMap, PRICING_BY_CUSTOMER,
    PRICING_BY_CUSTOMER_ATTRS, PRODUCT_ATTRS,
};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const PRICING_INCLUDES: [&str; 3] = [
    "vendor-pricing-by-customer.vendor-products.vendor-product-attrs",
    "vendor-pricing-by-customer.vendor-products.vendor-product-to-class-mapping.vendor-product-classes",
    "vendor-pricing-by-customer.vendor-pricing-by-customer-attrs",
];

const CLASS_PRICING_INCLUDE: &str =
    "vendor-pricing-classes.vendor-pricing-by-class.vendor-products.vendor-product-attrs";

/// Blocking client session: HTTP client, backend URL, credentials and the
/// current `Authorization` header.
pub struct ApiClient {
    client: Client,
    base_url: String,
    oauth: OAuthConfig,
    tokens: TokenStore,
    header: RwLock<Option<String>>,
    price_year: u16,
}

#[derive(Deserialize)]
struct DownloadLink {
    #[serde(rename = "downloadLink")]
    download_link: String,
}

impl ApiClient {
    /// Build a session from configuration. A cached token is picked up from
    /// the token store if one exists; otherwise the first request fetches one.
    ///
    /// # Errors
    ///
    /// Fails when the custom CA cannot be read or the HTTP client cannot be
    /// constructed.
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let mut builder =
            Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));
        match &config.tls {
            TlsVerify::Enabled => {}
            TlsVerify::Disabled => builder = builder.danger_accept_invalid_certs(true),
            TlsVerify::CustomCa(path) => {
                let pem = std::fs::read(path)?;
                builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
            }
        }
        let client = builder.build()?;
        let tokens = TokenStore::new(config.token_path.clone());
        let header = tokens.load();

        Ok(ApiClient {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            oauth: config.oauth.clone(),
            tokens,
            header: RwLock::new(header),
            price_year: config.price_year,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the current `Authorization` header value.
    pub fn set_token(&self, header: &str) {
        if let Ok(mut guard) = self.header.write() {
            *guard = Some(header.to_string());
        }
    }

    pub fn has_token(&self) -> bool {
        self.header.read().map(|h| h.is_some()).unwrap_or(false)
    }

    /// Request a new token, store it in the session and persist it.
    ///
    /// # Errors
    ///
    /// Propagates token endpoint failures.
    pub fn refresh_token(&self) -> Result<String, ApiError> {
        tracing::info!("requesting a new access token");
        let header = request_token(&self.client, &self.oauth)?;
        self.tokens.persist(&header);
        self.set_token(&header);
        Ok(header)
    }

    fn current_header(&self) -> Result<String, ApiError> {
        let cached = self.header.read().ok().and_then(|h| h.clone());
        match cached {
            Some(header) => Ok(header),
            None => self.refresh_token(),
        }
    }

    /// Send an authenticated request. `build` is called again for the retry,
    /// so it must produce a fresh request each time.
    pub(crate) fn send<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let header = self.current_header()?;
        let res = build(&self.client).header(AUTHORIZATION, header).send()?;
        if res.status() != StatusCode::UNAUTHORIZED {
            return Ok(res);
        }

        let header = self.refresh_token()?;
        let res = build(&self.client).header(AUTHORIZATION, header).send()?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        Ok(res)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn get(&self, path: &str) -> Result<Response, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        self.send(|c| c.get(&url))
    }

    pub(crate) fn post_json(&self, path: &str, body: &Value) -> Result<Response, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        self.send(|c| c.post(&url).json(body))
    }

    fn patch_json(&self, path: &str, body: &Value) -> Result<Response, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "PATCH");
        self.send(|c| c.patch(&url).json(body))
    }

    /// Fail with [`ApiError::Status`] unless `res` is a 2xx.
    pub(crate) fn expect_success(res: Response, context: &str) -> Result<Response, ApiError> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let body = res.text().unwrap_or_default();
        Err(ApiError::Status {
            context: context.to_string(),
            status,
            body,
        })
    }

    pub(crate) fn json<T: DeserializeOwned>(res: Response, context: &str) -> Result<T, ApiError> {
        let res = Self::expect_success(res, context)?;
        let body: Value = res.json()?;
        serde_json::from_value(body).map_err(|e| ApiError::decode(context, e))
    }

    fn document(&self, path: &str, context: &str) -> Result<Document, ApiError> {
        let res = self.get(path)?;
        Self::json(res, context)
    }

    /// All vendors known to the backend.
    ///
    /// # Errors
    ///
    /// Transport, status or decode failures.
    pub fn get_vendors(&self) -> Result<Vec<Vendor>, ApiError> {
        let document = self.document("/v2/vendors?page_number=0", "vendors")?;
        Ok(document
            .primary()
            .iter()
            .map(|v| Vendor {
                id: v.id.clone(),
                name: v
                    .attributes
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(&v.id)
                    .to_string(),
            })
            .collect())
    }

    /// Our customers with their accounts at `vendor`.
    ///
    /// # Errors
    ///
    /// Transport, status or decode failures.
    pub fn get_customers(&self, vendor: &Vendor) -> Result<Vec<CustomerGroup>, ApiError> {
        let path = format!(
            "/v2/vendors/{}/vendor-customers?include=customer-location-mapping.customer-locations.customers&page_number=0",
            vendor.id
        );
        let document = self.document(&path, "vendor customers")?;
        Ok(group_customers(&document, vendor))
    }

    /// Strategy pricing for one account, restricted to one product class.
    ///
    /// # Errors
    ///
    /// [`ApiError::Empty`] when the account has no products of that class,
    /// [`ApiError::Pricing`] when the pricing graph is inconsistent.
    pub fn get_pricing(
        &self,
        class: ProductClass,
        customer: &VendorCustomer,
    ) -> Result<PricingMap, ApiError> {
        let url = self.url(&format!(
            "/v2/vendors/{}/vendor-customers/{}",
            customer.vendor.id, customer.id
        ));
        let include = PRICING_INCLUDES.join(",");
        let res = self.send(|c| {
            c.get(&url).query(&[
                ("include", include.as_str()),
                ("filter_vendor_product_classes__name", class.wire_name()),
                ("filter_vendor_product_classes__rank", "1"),
            ])
        })?;
        let document: Document = Self::json(res, "customer pricing")?;
        if !document.has_data() {
            return Err(ApiError::Empty(class.wire_name().to_string()));
        }
        let resolved = resolve(&document.included, PRICING_BY_CUSTOMER, None);
        Ok(reconstruct_by_customer(&resolved)?)
    }

    /// The vendor's zero-discount list prices.
    ///
    /// # Errors
    ///
    /// [`ApiError::Empty`] when no zero-discount prices are present.
    pub fn get_zero_discount_pricing(&self, vendor: &Vendor) -> Result<PricingMap, ApiError> {
        let path = format!("/v2/vendors/{}?include={CLASS_PRICING_INCLUDE}", vendor.id);
        let document = self.document(&path, "class pricing")?;
        let resolved = resolve(document.resources(), "vendors", None);
        let pricing = reconstruct_by_class(&resolved)?;
        if pricing.is_empty() {
            return Err(ApiError::Empty("zero discount pricing".to_string()));
        }
        Ok(pricing)
    }

    /// Look up a model's pricing for a customer.
    ///
    /// # Errors
    ///
    /// [`ApiError::Status`] when the backend does not recognise the model.
    pub fn price_check(&self, customer: &VendorCustomer, model: &str) -> Result<PriceCheck, ApiError> {
        let url = self.url(&format!("/vendors/{}/model-lookup", customer.vendor.id));
        let year = self.price_year.to_string();
        let res = self.send(|c| {
            c.get(&url).query(&[
                ("model_num", model),
                ("customer_id", customer.id.as_str()),
                ("price_year", year.as_str()),
            ])
        })?;
        Self::json(res, &format!("price check for {model}"))
    }

    /// Ask the backend for a one-off download link to the customer's program.
    ///
    /// # Errors
    ///
    /// [`ApiError::Status`] when no link is issued.
    pub fn request_download_link(
        &self,
        customer: &VendorCustomer,
        stage: Stage,
    ) -> Result<String, ApiError> {
        let path = format!(
            "/vendors/{}/programs/{}/download?stage={}",
            customer.vendor.id,
            customer.id,
            stage.wire_name()
        );
        let url = self.url(&path);
        let res = self.send(|c| c.post(&url))?;
        let link: DownloadLink = Self::json(res, "Unable to obtain download link")?;
        Ok(link.download_link)
    }

    /// Download the customer's program file into `save_dir`, returning the
    /// saved path.
    ///
    /// # Errors
    ///
    /// [`ApiError::FileSave`] when the file cannot be written (typically
    /// because it is open elsewhere).
    pub fn download_program(
        &self,
        customer: &VendorCustomer,
        stage: Stage,
        save_dir: &Path,
    ) -> Result<PathBuf, ApiError> {
        let link = self.request_download_link(customer, stage)?;
        let res = Self::expect_success(self.get(&link)?, "program download")?;
        let filename = res
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(files::filename_from_content_disposition)
            .unwrap_or_else(|| files::DEFAULT_PROGRAM_FILENAME.to_string());
        let bytes = res.bytes()?;
        files::save_bytes(save_dir, &filename, &bytes)
    }

    /// Ratings uploaded for the customer, sorted by outdoor then indoor model.
    ///
    /// # Errors
    ///
    /// [`ApiError::Empty`] when the customer has none.
    pub fn get_ratings(&self, customer: &VendorCustomer) -> Result<Vec<Rating>, ApiError> {
        #[derive(Deserialize)]
        struct Ratings {
            #[serde(default)]
            data: Option<Vec<Rating>>,
        }

        let path = format!(
            "/vendors/{}/{}/adp-program-ratings",
            customer.vendor.id, customer.id
        );
        let res = self.get(&path)?;
        let mut ratings = Self::json::<Ratings>(res, "ratings")?
            .data
            .unwrap_or_default();
        if ratings.is_empty() {
            return Err(ApiError::Empty("Ratings".to_string()));
        }
        crate::models::sort_ratings(&mut ratings);
        Ok(ratings)
    }

    /// Upload a ratings spreadsheet for the customer.
    ///
    /// # Errors
    ///
    /// [`ApiError::Upload`] when no file was chosen or the backend rejects it.
    pub fn upload_ratings(&self, customer: &VendorCustomer, file: &Path) -> Result<(), ApiError> {
        if file.as_os_str().is_empty() {
            return Err(ApiError::Upload("no file selected".to_string()));
        }
        let data = std::fs::read(file)?;
        let file_name = file
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("ratings.xlsx")
            .to_string();
        let url = self.url(&format!(
            "/vendors/{}/adp-program-ratings/{}",
            customer.vendor.id, customer.id
        ));

        let res = self.send(|c| {
            let part = multipart::Part::bytes(data.clone())
                .file_name(file_name.clone())
                .mime_str(XLSX_MIME)
                .expect("static mime type is valid");
            c.post(&url)
                .multipart(multipart::Form::new().part("ratings_file", part))
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_default();
            return Err(ApiError::Upload(format!(
                "Ratings were not able to be uploaded successfully. Status code {status}. Message:\n {txt}"
            )));
        }
        Ok(())
    }

    /// Delete one rating.
    ///
    /// # Errors
    ///
    /// [`ApiError::Status`] on a non-2xx answer.
    pub fn delete_rating(&self, customer: &VendorCustomer, rating_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/vendors/{}/{}/adp-program-ratings/{rating_id}",
            customer.vendor.id, customer.id
        ));
        let res = self.send(|c| c.delete(&url))?;
        Self::expect_success(res, "rating delete")?;
        Ok(())
    }

    /// Change the value of a product attribute.
    ///
    /// # Errors
    ///
    /// [`ApiError::Status`] on a non-2xx answer.
    pub fn update_product_attr(&self, attr_id: &str, value: &str) -> Result<(), ApiError> {
        self.update_attr(PRODUCT_ATTRS, attr_id, value)
    }

    /// Change the value of a customer pricing attribute such as the custom
    /// description.
    ///
    /// # Errors
    ///
    /// [`ApiError::Status`] on a non-2xx answer.
    pub fn update_customer_attr(&self, attr_id: &str, value: &str) -> Result<(), ApiError> {
        self.update_attr(PRICING_BY_CUSTOMER_ATTRS, attr_id, value)
    }

    fn update_attr(&self, kind: &str, attr_id: &str, value: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "data": {
                "id": attr_id,
                "type": kind,
                "attributes": {"value": value},
            }
        });
        let res = self.patch_json(&format!("/v2/vendors/{kind}/{attr_id}"), &body)?;
        Self::expect_success(res, &format!("update of {kind} {attr_id}"))?;
        Ok(())
    }
}
