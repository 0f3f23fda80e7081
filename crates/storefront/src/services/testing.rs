//! In-memory backend for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use union_bakery_core::{AuthPayload, Money};

use crate::backend::{
    AddCartLinePayload, ApiErrorBody, BackendApi, BackendError, CartCost, CartData, CartLine,
    CartMerchandise, CheckoutPayload, CheckoutResult, CustomerProfile, LineInput, LoginPayload,
    MerchandiseProduct, Nodes, ProductDetail, ProductListItem, RegisterPayload,
    RemoveCartItemPayload, UpdateCartLinePayload,
};

pub fn sample_line(id: &str, title: &str, price: i64) -> CartLine {
    CartLine {
        id: id.to_string(),
        quantity: 1,
        attributes: Vec::new(),
        merchandise: CartMerchandise {
            id: format!("variant-{id}"),
            available_for_sale: true,
            title: "Default Title".to_string(),
            price: Money::new(Decimal::from(price), "IDR"),
            product: MerchandiseProduct {
                title: title.to_string(),
            },
            image: None,
        },
    }
}

pub fn sample_cart(id: &str, line_ids: &[&str]) -> CartData {
    let mut cart = CartData {
        id: id.to_string(),
        buyer_identity: None,
        lines: Nodes {
            nodes: line_ids
                .iter()
                .map(|line_id| sample_line(line_id, "Fudge Cake", 150_000))
                .collect(),
        },
        cost: CartCost {
            subtotal_amount: Money::new(Decimal::ZERO, "IDR"),
        },
    };
    recompute(&mut cart);
    cart
}

pub fn sample_product(handle: &str, title: &str) -> ProductListItem {
    ProductListItem {
        id: format!("product-{handle}"),
        title: title.to_string(),
        handle: handle.to_string(),
        price_range: None,
        bestseller: None,
        seasonal: None,
        media: None,
    }
}

fn recompute(cart: &mut CartData) {
    cart.cost.subtotal_amount.amount = cart
        .lines
        .nodes
        .iter()
        .map(|line| line.line_total().amount)
        .sum();
}

fn not_found(what: &str) -> BackendError {
    BackendError::Api {
        status: 404,
        body: ApiErrorBody::message(format!("{what} not found")),
    }
}

/// Records calls and serves carts from memory.
#[derive(Default)]
pub struct FakeBackend {
    carts: Mutex<HashMap<String, CartData>>,
    products: Mutex<Vec<ProductListItem>>,
    details: Mutex<HashMap<String, ProductDetail>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashSet<&'static str>>,
    hook: Mutex<Option<BoxFuture<'static, ()>>>,
    checkouts: Mutex<Vec<(CheckoutPayload, String)>>,
    auth: Mutex<Option<AuthPayload>>,
    next_id: Mutex<usize>,
}

impl FakeBackend {
    pub fn put_cart(&self, cart: CartData) {
        self.carts.lock().unwrap().insert(cart.id.clone(), cart);
    }

    pub fn cart(&self, id: &str) -> Option<CartData> {
        self.carts.lock().unwrap().get(id).cloned()
    }

    pub fn set_products(&self, products: Vec<ProductListItem>) {
        *self.products.lock().unwrap() = products;
    }

    pub fn put_detail(&self, slug: &str, detail: ProductDetail) {
        self.details.lock().unwrap().insert(slug.to_string(), detail);
    }

    pub fn set_login(&self, auth: AuthPayload) {
        *self.auth.lock().unwrap() = Some(auth);
    }

    /// Make the next call to `operation` fail with a 503.
    pub fn fail_next(&self, operation: &'static str) {
        self.failures.lock().unwrap().insert(operation);
    }

    /// Run `future` inside the next call, before it answers.
    pub fn before_next_call(&self, future: BoxFuture<'static, ()>) {
        *self.hook.lock().unwrap() = Some(future);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Checkouts placed so far, with the token each was placed under.
    pub fn checkouts(&self) -> Vec<(CheckoutPayload, String)> {
        self.checkouts.lock().unwrap().clone()
    }

    async fn enter(&self, operation: &'static str) -> Result<(), BackendError> {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook.await;
        }
        if self.failures.lock().unwrap().remove(operation) {
            return Err(BackendError::Status { status: 503 });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}-new-{next}")
    }

    fn push_line(&self, cart: &mut CartData, line: &LineInput) {
        let mut new_line = sample_line(&self.next_id("line"), "Fudge Cake", 150_000);
        new_line.quantity = line.quantity;
        new_line.merchandise.id.clone_from(&line.variant_id);
        if let Some(text) = &line.cake_wording {
            new_line.attributes.push(crate::backend::CartAttribute {
                key: crate::backend::CAKE_WORDING_KEY.to_string(),
                value: text.clone(),
            });
        }
        cart.lines.nodes.push(new_line);
        recompute(cart);
    }

    fn with_cart(
        &self,
        cart_id: &str,
        change: impl FnOnce(&mut CartData),
    ) -> Result<CartData, BackendError> {
        let mut carts = self.carts.lock().unwrap();
        let cart = carts.get_mut(cart_id).ok_or_else(|| not_found("Cart"))?;
        change(cart);
        recompute(cart);
        Ok(cart.clone())
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn login(&self, _payload: &LoginPayload) -> Result<AuthPayload, BackendError> {
        self.enter("login").await?;
        self.auth.lock().unwrap().clone().ok_or(BackendError::Api {
            status: 401,
            body: ApiErrorBody::message("Invalid email or password"),
        })
    }

    async fn register(
        &self,
        _payload: &RegisterPayload,
    ) -> Result<Option<AuthPayload>, BackendError> {
        self.enter("register").await?;
        Ok(self.auth.lock().unwrap().clone())
    }

    async fn customer(&self, _token: &str) -> Result<CustomerProfile, BackendError> {
        self.enter("customer").await?;
        Ok(CustomerProfile {
            id: "customer-1".to_string(),
            first_name: "Sari".to_string(),
            last_name: "Wijaya".to_string(),
            email: "sari@example.com".to_string(),
            display_name: String::new(),
        })
    }

    async fn all_products(&self) -> Result<Vec<ProductListItem>, BackendError> {
        self.enter("all_products").await?;
        Ok(self.products.lock().unwrap().clone())
    }

    async fn product(&self, slug: &str) -> Result<ProductDetail, BackendError> {
        self.enter("product").await?;
        self.details
            .lock()
            .unwrap()
            .get(slug)
            .cloned()
            .ok_or_else(|| not_found("Product"))
    }

    async fn create_cart(
        &self,
        line: &LineInput,
        _token: Option<&str>,
    ) -> Result<CartData, BackendError> {
        self.enter("create_cart").await?;
        let mut cart = sample_cart(&self.next_id("cart"), &[]);
        self.push_line(&mut cart, line);
        self.put_cart(cart.clone());
        Ok(cart)
    }

    async fn add_cart_line(
        &self,
        payload: &AddCartLinePayload,
        _token: Option<&str>,
    ) -> Result<CartData, BackendError> {
        self.enter("add_cart_line").await?;
        let mut cart = self.cart(&payload.cart_id).ok_or_else(|| not_found("Cart"))?;
        self.push_line(&mut cart, &payload.line);
        self.put_cart(cart.clone());
        Ok(cart)
    }

    async fn get_cart(&self, cart_id: &str) -> Result<Option<CartData>, BackendError> {
        self.enter("get_cart").await?;
        Ok(self.cart(cart_id))
    }

    async fn update_cart_line(
        &self,
        payload: &UpdateCartLinePayload,
    ) -> Result<CartData, BackendError> {
        self.enter("update_cart_line").await?;
        self.with_cart(&payload.cart_id, |cart| {
            if let Some(line) = cart
                .lines
                .nodes
                .iter_mut()
                .find(|line| line.id == payload.line_id)
            {
                if let Some(quantity) = payload.quantity {
                    line.quantity = quantity;
                }
            }
        })
    }

    async fn remove_cart_line(
        &self,
        payload: &RemoveCartItemPayload,
    ) -> Result<CartData, BackendError> {
        self.enter("remove_cart_line").await?;
        self.with_cart(&payload.cart_id, |cart| {
            cart.lines.nodes.retain(|line| line.id != payload.line_ids);
        })
    }

    async fn update_buyer_identity(
        &self,
        cart_id: &str,
        _token: &str,
    ) -> Result<CartData, BackendError> {
        self.enter("update_buyer_identity").await?;
        self.with_cart(cart_id, |_| {})
    }

    async fn checkout(
        &self,
        payload: &CheckoutPayload,
        token: &str,
    ) -> Result<CheckoutResult, BackendError> {
        self.enter("checkout").await?;
        self.checkouts
            .lock()
            .unwrap()
            .push((payload.clone(), token.to_string()));
        Ok(CheckoutResult {
            message: "Order placed".to_string(),
        })
    }
}
