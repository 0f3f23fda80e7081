//! Mock payment page.
//!
//! Reached after a successful checkout. Collects contact, delivery address
//! and payment method, stores them as [`CheckoutInfo`] and moves on to the
//! order confirmation. No payment is taken.

use std::collections::BTreeMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;
use union_bakery_core::{Email, format_thousands};

use crate::error::AppError;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::PageContext;
use crate::services::checkout::load_last_order;
use crate::storage::{
    CheckoutInfo, ClientStorage, DeliveryAddress, OrderSnapshot, PaymentMethod, ShippingMethod,
};
use crate::state::AppState;

/// Payment form data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentForm {
    pub contact_email: String,
    pub country: String,
    pub first_name: String,
    pub last_name: String,
    pub province: String,
    pub city: String,
    pub address: String,
    pub postal_code: String,
    pub phone: String,
    pub payment_method: PaymentMethod,
}

impl PaymentForm {
    /// Prefill from stored details, falling back to the order's phone.
    fn prefill(info: Option<CheckoutInfo>, order: &OrderSnapshot) -> Self {
        let Some(info) = info else {
            return Self {
                country: "Indonesia".to_string(),
                phone: order.phone.clone(),
                ..Self::default()
            };
        };
        let delivery = info.delivery;
        Self {
            contact_email: info.contact_email,
            country: delivery.country,
            first_name: delivery.first_name,
            last_name: delivery.last_name,
            province: delivery.province,
            city: delivery.city,
            address: delivery.address,
            postal_code: delivery.postal_code,
            phone: delivery.phone,
            payment_method: info.payment_method,
        }
    }

    /// Validate into the record to store, or field messages.
    fn validate(&self) -> Result<CheckoutInfo, BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();

        let email = match Email::parse(self.contact_email.trim()) {
            Ok(email) => Some(email),
            Err(e) => {
                errors.insert("contactEmail".to_string(), e.to_string());
                None
            }
        };

        let required = [
            ("firstName", &self.first_name, "Please enter your first name"),
            ("address", &self.address, "Please enter a delivery address"),
            ("city", &self.city, "Please enter a city"),
            ("phone", &self.phone, "Please enter a phone number"),
        ];
        for (field, value, message) in required {
            if value.trim().is_empty() {
                errors.insert(field.to_string(), message.to_string());
            }
        }

        match email {
            Some(email) if errors.is_empty() => Ok(CheckoutInfo {
                contact_email: email.into_inner(),
                delivery: DeliveryAddress {
                    country: self.country.trim().to_string(),
                    first_name: self.first_name.trim().to_string(),
                    last_name: self.last_name.trim().to_string(),
                    province: self.province.trim().to_string(),
                    city: self.city.trim().to_string(),
                    address: self.address.trim().to_string(),
                    postal_code: self.postal_code.trim().to_string(),
                    phone: self.phone.trim().to_string(),
                },
                shipping_method: ShippingMethod::internal_courier(),
                payment_method: self.payment_method,
            }),
            _ => Err(errors),
        }
    }
}

/// Order summary line for the payment page.
pub struct SummaryLine {
    pub title: String,
    pub quantity: u32,
    pub note: Option<String>,
    pub price: String,
}

/// Payment page template.
#[derive(Template, WebTemplate)]
#[template(path = "pages/checkout.html")]
pub struct CheckoutTemplate {
    pub page: PageContext,
    pub form: PaymentForm,
    pub errors: BTreeMap<String, String>,
    pub lines: Vec<SummaryLine>,
    pub subtotal: String,
    pub shipping: ShippingMethod,
    pub shipping_price: String,
    pub total: String,
    pub payment_methods: [PaymentMethod; 2],
}

impl CheckoutTemplate {
    fn new(
        page: PageContext,
        form: PaymentForm,
        errors: BTreeMap<String, String>,
        order: &OrderSnapshot,
    ) -> Self {
        let shipping = ShippingMethod::internal_courier();
        Self {
            page,
            form,
            errors,
            lines: order
                .lines
                .iter()
                .map(|line| SummaryLine {
                    title: line.title.clone(),
                    quantity: line.quantity,
                    note: line.note.clone(),
                    price: format_thousands(line.total()),
                })
                .collect(),
            subtotal: format_thousands(order.subtotal),
            shipping_price: format_thousands(shipping.price),
            total: format_thousands(order.subtotal + shipping.price),
            shipping,
            payment_methods: [PaymentMethod::Qris, PaymentMethod::BankTransfer],
        }
    }

    fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

/// Display the payment page for the last order.
///
/// Without a live order there is nothing to pay for, so the visitor is sent
/// back to the cart.
#[instrument(skip(state, storage, auth))]
pub async fn show(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
) -> Result<Response, AppError> {
    let ttl = state.config().cache.order_ttl_chrono();
    let Some(order) = load_last_order(&storage, Utc::now(), ttl).await? else {
        return Ok(Redirect::to("/cart").into_response());
    };

    let info = storage.load::<CheckoutInfo>().await?;
    let form = PaymentForm::prefill(info, order.order());
    let page = PageContext::load(&state, &storage, &auth).await;

    Ok(CheckoutTemplate::new(page, form, BTreeMap::new(), order.order()).into_response())
}

/// Store the payment details and show the order confirmation.
#[instrument(skip(state, storage, auth, form))]
pub async fn submit(
    State(state): State<AppState>,
    storage: ClientStorage,
    OptionalAuth(auth): OptionalAuth,
    Form(form): Form<PaymentForm>,
) -> Result<Response, AppError> {
    let ttl = state.config().cache.order_ttl_chrono();
    let Some(order) = load_last_order(&storage, Utc::now(), ttl).await? else {
        return Ok(Redirect::to("/cart").into_response());
    };

    match form.validate() {
        Ok(info) => {
            storage.save(&info).await?;
            tracing::info!(payment_method = info.payment_method.label(), "Payment details saved");
            Ok(Redirect::to("/account/order").into_response())
        }
        Err(errors) => {
            let page = PageContext::load(&state, &storage, &auth).await;
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutTemplate::new(page, form, errors, order.order()),
            )
                .into_response())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn filled() -> PaymentForm {
        PaymentForm {
            contact_email: " sari@example.com ".to_string(),
            country: "Indonesia".to_string(),
            first_name: "Sari".to_string(),
            last_name: "Wijaya".to_string(),
            province: "DKI Jakarta".to_string(),
            city: "Jakarta".to_string(),
            address: "Jl. Kemang Raya 12".to_string(),
            postal_code: "12730".to_string(),
            phone: "0812 3456".to_string(),
            payment_method: PaymentMethod::BankTransfer,
        }
    }

    fn order() -> OrderSnapshot {
        OrderSnapshot {
            delivery_date: "2030-02-14".to_string(),
            delivery_time: "3PM - 5PM".to_string(),
            phone: "08123456".to_string(),
            lines: Vec::new(),
            subtotal: Decimal::from(300_000),
        }
    }

    #[test]
    fn test_valid_form_builds_checkout_info() {
        let info = filled().validate().unwrap();
        assert_eq!(info.contact_email, "sari@example.com");
        assert_eq!(info.shipping_method.id, "internal_courier");
        assert_eq!(info.payment_method, PaymentMethod::BankTransfer);
    }

    #[test]
    fn test_invalid_form_reports_fields() {
        let form = PaymentForm {
            contact_email: "not-an-email".to_string(),
            city: " ".to_string(),
            ..filled()
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.contains_key("contactEmail"));
        assert!(errors.contains_key("city"));
        assert!(!errors.contains_key("address"));
    }

    #[test]
    fn test_prefill_uses_order_phone() {
        let form = PaymentForm::prefill(None, &order());
        assert_eq!(form.phone, "08123456");
        assert_eq!(form.country, "Indonesia");
    }

    #[test]
    fn test_totals_include_shipping() {
        let template = CheckoutTemplate::new(
            PageContext::default(),
            PaymentForm::default(),
            BTreeMap::new(),
            &order(),
        );
        assert_eq!(template.subtotal, "300");
        assert_eq!(template.shipping_price, "25");
        assert_eq!(template.total, "325");
    }
}
