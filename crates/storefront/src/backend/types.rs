//! Request and response shapes exchanged with the bakery backend.
//!
//! All field names are camelCase on the wire.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use union_bakery_core::Money;

// =============================================================================
// Envelope
// =============================================================================

/// Successful response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSuccess<T> {
    pub success: bool,
    pub data: T,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFieldError {
    /// Field name the message belongs to.
    pub error: String,
    pub message: String,
}

/// Failure envelope: `{ success: false, message, code?, errors? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiFieldError>,
}

impl ApiErrorBody {
    /// Build a failure body with just a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: None,
            errors: Vec::new(),
        }
    }

    /// Field messages keyed by field name. The first message per field wins.
    #[must_use]
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        for item in &self.errors {
            fields
                .entry(item.error.clone())
                .or_insert_with(|| item.message.clone());
        }
        fields
    }
}

/// A `{ nodes: [...] }` connection wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

impl<T> Default for Nodes<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

// =============================================================================
// Auth & customer
// =============================================================================

/// `POST /login` body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

/// `POST /register` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Customer profile returned by `GET /customer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
}

impl CustomerProfile {
    /// Display name, falling back to first + last name.
    #[must_use]
    pub fn name(&self) -> String {
        if !self.display_name.trim().is_empty() {
            return self.display_name.clone();
        }
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

// =============================================================================
// Products
// =============================================================================

/// Price range of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    #[serde(default)]
    pub max_variant_price: Option<Money>,
}

/// Preview image attached to a catalog media node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewImage {
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
}

/// A catalog media node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMedia {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub preview_image: Option<PreviewImage>,
}

/// An entry from `GET /all-products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub bestseller: Option<bool>,
    #[serde(default)]
    pub seasonal: Option<bool>,
    #[serde(default)]
    pub media: Option<Nodes<ProductMedia>>,
}

impl ProductListItem {
    /// Highest variant price, if the backend sent one.
    #[must_use]
    pub fn max_price(&self) -> Option<&Money> {
        self.price_range.as_ref()?.max_variant_price.as_ref()
    }

    /// First media preview image.
    #[must_use]
    pub fn preview_image(&self) -> Option<&PreviewImage> {
        self.media
            .as_ref()?
            .nodes
            .iter()
            .find_map(|media| media.preview_image.as_ref())
    }

    /// The flags as a standalone value.
    #[must_use]
    pub const fn flags(&self) -> ProductFlags {
        ProductFlags {
            bestseller: self.bestseller,
            seasonal: self.seasonal,
        }
    }
}

/// Promotional flags for a product. `None` means "not flagged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFlags {
    #[serde(default)]
    pub bestseller: Option<bool>,
    #[serde(default)]
    pub seasonal: Option<bool>,
}

impl ProductFlags {
    /// Badge labels in display order.
    #[must_use]
    pub fn badge_labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.bestseller == Some(true) {
            labels.push("Best Seller");
        }
        if self.seasonal == Some(true) {
            labels.push("Seasonal");
        }
        labels
    }
}

/// A selected option on a variant (`Size: 20cm`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

/// A purchasable product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub available_for_sale: bool,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
    pub price: Money,
}

impl ProductVariant {
    /// Value of the named option, case-insensitively.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.selected_options
            .iter()
            .find(|option| option.name.eq_ignore_ascii_case(name))
            .map(|option| option.value.as_str())
    }
}

/// A value of a product option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOptionValue {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

/// A product option such as size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductOption {
    pub name: String,
    #[serde(default)]
    pub option_values: Vec<ProductOptionValue>,
}

/// A product image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Product detail from `GET /product/{slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variants: Nodes<ProductVariant>,
    #[serde(default)]
    pub options: Vec<ProductOption>,
    #[serde(default)]
    pub images: Nodes<ProductImage>,
}

impl ProductDetail {
    /// The variant preselected on the product page: the first one available
    /// for sale, else the first one.
    #[must_use]
    pub fn default_variant(&self) -> Option<&ProductVariant> {
        let variants = &self.variants.nodes;
        variants
            .iter()
            .find(|variant| variant.available_for_sale)
            .or_else(|| variants.first())
    }

    /// Look up a variant by id.
    #[must_use]
    pub fn variant(&self, id: &str) -> Option<&ProductVariant> {
        self.variants.nodes.iter().find(|variant| variant.id == id)
    }

    /// Whether the product offers a size choice.
    #[must_use]
    pub fn has_size_option(&self) -> bool {
        self.options
            .iter()
            .any(|option| option.name.eq_ignore_ascii_case("size") && option.option_values.len() > 1)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A key/value attribute on a cart line (cake wording, greeting card text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartAttribute {
    pub key: String,
    pub value: String,
}

/// Image on a cart line's merchandise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartImage {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// The product a merchandise belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchandiseProduct {
    pub title: String,
}

/// The variant behind a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandise {
    pub id: String,
    #[serde(default)]
    pub available_for_sale: bool,
    #[serde(default)]
    pub title: String,
    pub price: Money,
    pub product: MerchandiseProduct,
    #[serde(default)]
    pub image: Option<CartImage>,
}

/// Attribute key holding the text piped onto the cake.
pub const CAKE_WORDING_KEY: &str = "Cake Wording";
/// Attribute key holding the greeting card text.
pub const GREETING_WORDING_KEY: &str = "Greetings";

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: String,
    pub quantity: u32,
    #[serde(default)]
    pub attributes: Vec<CartAttribute>,
    pub merchandise: CartMerchandise,
}

impl CartLine {
    /// Attribute value by key, case-insensitively, ignoring blank values.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.key.eq_ignore_ascii_case(key))
            .map(|attribute| attribute.value.trim())
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn cake_wording(&self) -> Option<&str> {
        self.attribute(CAKE_WORDING_KEY)
    }

    #[must_use]
    pub fn greeting_wording(&self) -> Option<&str> {
        self.attribute(GREETING_WORDING_KEY)
    }

    /// Every non-empty attribute value joined by ` · `.
    #[must_use]
    pub fn note(&self) -> Option<String> {
        let values: Vec<&str> = self
            .attributes
            .iter()
            .map(|attribute| attribute.value.trim())
            .filter(|value| !value.is_empty())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.join(" · "))
        }
    }

    /// Short phrase describing the personalisation on this line.
    #[must_use]
    pub fn wording_phrase(&self) -> Option<&'static str> {
        match (self.cake_wording().is_some(), self.greeting_wording().is_some()) {
            (true, true) => Some("with cake wording & greeting card"),
            (true, false) => Some("with cake wording"),
            (false, true) => Some("with greeting card"),
            (false, false) => None,
        }
    }

    /// Variant title followed by the wording phrase, as shown under the title.
    #[must_use]
    pub fn subtitle(&self) -> String {
        [Some(self.merchandise.title.trim()), self.wording_phrase()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Product title, falling back to the variant title.
    #[must_use]
    pub fn title(&self) -> &str {
        let product = self.merchandise.product.title.trim();
        if product.is_empty() {
            &self.merchandise.title
        } else {
            product
        }
    }

    /// Variant title, hidden when it is the default placeholder.
    #[must_use]
    pub fn variant_title(&self) -> Option<&str> {
        let title = self.merchandise.title.trim();
        (!title.is_empty() && title != "Default Title" && title != self.title()).then_some(title)
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.merchandise.price.times(self.quantity)
    }
}

/// Customer attached to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerCustomer {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Buyer identity of a cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerIdentity {
    #[serde(default)]
    pub customer: Option<BuyerCustomer>,
}

/// Cart totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCost {
    pub subtotal_amount: Money,
}

/// A cart as returned by every cart endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartData {
    pub id: String,
    #[serde(default)]
    pub buyer_identity: Option<BuyerIdentity>,
    #[serde(default)]
    pub lines: Nodes<CartLine>,
    pub cost: CartCost,
}

impl CartData {
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines.nodes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.nodes.is_empty()
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.lines.nodes.iter().map(|line| line.quantity).sum()
    }

    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.cost.subtotal_amount.amount
    }

    /// Line ids in display order.
    #[must_use]
    pub fn line_ids(&self) -> Vec<String> {
        self.lines.nodes.iter().map(|line| line.id.clone()).collect()
    }

    #[must_use]
    pub fn line(&self, line_id: &str) -> Option<&CartLine> {
        self.lines.nodes.iter().find(|line| line.id == line_id)
    }

    /// Lines whose product title matches, case-insensitively.
    #[must_use]
    pub fn lines_for_product(&self, product_title: &str) -> Vec<&CartLine> {
        let wanted = product_title.trim().to_lowercase();
        self.lines
            .nodes
            .iter()
            .filter(|line| line.title().to_lowercase() == wanted)
            .collect()
    }
}

/// `data` of `POST /get-cart`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetCartData {
    #[serde(default)]
    pub cart: Option<CartData>,
}

/// Inner object of the `POST /update-cart-line` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CartLinesUpdate {
    pub cart: CartData,
}

/// `data` of `POST /update-cart-line`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartLineData {
    pub cart_lines_update: CartLinesUpdate,
}

/// A line to add, with optional personalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInput {
    pub variant_id: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cake_wording: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting_wording: Option<String>,
}

impl LineInput {
    /// A plain line without personalisation.
    #[must_use]
    pub fn new(variant_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            variant_id: variant_id.into(),
            quantity,
            cake_wording: None,
            greeting_wording: None,
        }
    }
}

/// `POST /cart-line-add` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartLinePayload {
    pub cart_id: String,
    #[serde(flatten)]
    pub line: LineInput,
}

/// `POST /get-cart` and `POST /update-cart-buyer-identity` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartIdPayload {
    pub cart_id: String,
}

/// `POST /update-cart-line` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartLinePayload {
    pub cart_id: String,
    pub line_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cake_wording: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting_wording: Option<String>,
}

/// `POST /remove-cart-item` body. The backend takes a single line id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCartItemPayload {
    pub cart_id: String,
    pub line_ids: String,
}

/// `POST /checkout` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    #[serde(default)]
    pub cart_id: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub delivery_time: String,
    #[serde(default)]
    pub delivery_date: String,
}

/// `data` of `POST /checkout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn line_json(id: &str, title: &str, attributes: serde_json::Value) -> serde_json::Value {
        json!({
            "id": id,
            "quantity": 2,
            "attributes": attributes,
            "merchandise": {
                "id": "gid://variant/1",
                "availableForSale": true,
                "title": "20cm",
                "price": { "amount": "150000.0", "currencyCode": "IDR" },
                "product": { "title": title },
                "image": null
            }
        })
    }

    #[test]
    fn test_cart_data_parses_backend_shape() {
        let cart: CartData = serde_json::from_value(json!({
            "id": "cart-1",
            "buyerIdentity": { "customer": null },
            "lines": { "nodes": [line_json("line-1", "Red Velvet", json!([]))] },
            "cost": { "subtotalAmount": { "amount": 300_000, "currencyCode": "IDR" } }
        }))
        .unwrap();

        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.line_ids(), vec!["line-1".to_string()]);
        assert_eq!(cart.subtotal(), Decimal::from(300_000));
        assert_eq!(cart.lines()[0].line_total().display(), "300");
    }

    #[test]
    fn test_line_note_joins_attribute_values() {
        let line: CartLine = serde_json::from_value(line_json(
            "l",
            "Cheesecake",
            json!([
                { "key": "cake wording", "value": "Happy Birthday" },
                { "key": "Greetings", "value": "Love, Mum" }
            ]),
        ))
        .unwrap();

        assert_eq!(line.note().as_deref(), Some("Happy Birthday · Love, Mum"));
        assert_eq!(line.wording_phrase(), Some("with cake wording & greeting card"));
        assert_eq!(line.subtitle(), "20cm with cake wording & greeting card");
        assert_eq!(line.variant_title(), Some("20cm"));
    }

    #[test]
    fn test_wording_phrase_single_attribute() {
        let line: CartLine = serde_json::from_value(line_json(
            "l",
            "Cheesecake",
            json!([{ "key": "Greetings", "value": "Hi" }]),
        ))
        .unwrap();
        assert_eq!(line.wording_phrase(), Some("with greeting card"));
    }

    #[test]
    fn test_blank_attributes_are_ignored() {
        let line: CartLine = serde_json::from_value(line_json(
            "l",
            "Cheesecake",
            json!([{ "key": "Cake Wording", "value": "   " }]),
        ))
        .unwrap();
        assert_eq!(line.note(), None);
        assert_eq!(line.wording_phrase(), None);
    }

    #[test]
    fn test_lines_for_product_is_case_insensitive() {
        let cart: CartData = serde_json::from_value(json!({
            "id": "cart-1",
            "lines": { "nodes": [
                line_json("a", "Red Velvet", json!([])),
                line_json("b", "Tiramisu", json!([])),
            ] },
            "cost": { "subtotalAmount": { "amount": "0" } }
        }))
        .unwrap();

        let matches = cart.lines_for_product("red velvet");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }

    #[test]
    fn test_add_line_payload_flattens_line() {
        let payload = AddCartLinePayload {
            cart_id: "cart-1".to_string(),
            line: LineInput {
                cake_wording: Some("Hi".to_string()),
                ..LineInput::new("v1", 1)
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({ "cartId": "cart-1", "variantId": "v1", "quantity": 1, "cakeWording": "Hi" })
        );
    }

    #[test]
    fn test_badge_labels_order() {
        let flags = ProductFlags {
            bestseller: Some(true),
            seasonal: Some(true),
        };
        assert_eq!(flags.badge_labels(), vec!["Best Seller", "Seasonal"]);
        assert!(ProductFlags::default().badge_labels().is_empty());
    }

    #[test]
    fn test_default_variant_prefers_available() {
        let detail: ProductDetail = serde_json::from_value(json!({
            "id": "p1",
            "title": "Tiramisu",
            "variants": { "nodes": [
                { "id": "v1", "availableForSale": false, "price": { "amount": "1" } },
                { "id": "v2", "availableForSale": true, "price": { "amount": "2" } }
            ] }
        }))
        .unwrap();
        assert_eq!(detail.default_variant().map(|v| v.id.as_str()), Some("v2"));
    }

    #[test]
    fn test_error_body_field_errors() {
        let body: ApiErrorBody = serde_json::from_value(json!({
            "success": false,
            "message": "Validation failed",
            "code": 422,
            "errors": [
                { "error": "password", "message": "Too short" },
                { "error": "password", "message": "Needs a digit" }
            ]
        }))
        .unwrap();
        assert_eq!(
            body.field_errors().get("password").map(String::as_str),
            Some("Too short")
        );
    }
}
