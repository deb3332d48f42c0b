//! Request validation. Rules collect every failure before responding so
//! clients can highlight all bad fields at once.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use hal_db::models::ProductDraft;
use hal_db::queries::ProductUpdate;
use hal_types::api::{CreateProductRequest, FieldError, ImageInput, RegisterRequest, UpdateProductRequest};
use hal_types::models::{Category, Currency, ProductImage, ProductLocation, UserType, Unit};

use crate::error::ApiError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,16}$").expect("phone regex"));

pub fn is_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

pub fn is_phone(s: &str) -> bool {
    PHONE_RE.is_match(s)
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    /// Character count of the trimmed value must be within `min..=max`.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize, message: &str) -> &mut Self {
        let n = value.trim().chars().count();
        self.check(n >= min && n <= max, field, message)
    }

    /// Parse an enum-valued field, recording an error on failure.
    pub fn parse<T: FromStr>(&mut self, field: &str, value: &str, message: &str) -> Option<T> {
        let parsed = T::from_str(value.trim()).ok();
        self.check(parsed.is_some(), field, message);
        parsed
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

#[cfg_attr(test, derive(Debug))]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub user_type: UserType,
}

pub fn registration(req: RegisterRequest) -> Result<Registration, ApiError> {
    let mut v = Validator::new();
    v.length("name", &req.name, 2, 50, "Name must be 2-50 characters")
        .check(is_email(req.email.trim()), "email", "Please provide a valid email")
        .check(req.password.chars().count() >= 6, "password", "Password must be at least 6 characters")
        .check(is_phone(req.phone.trim()), "phone", "Please provide a valid phone number");
    let user_type = match req.user_type.as_str() {
        "buyer" => Some(UserType::Buyer),
        "seller" => Some(UserType::Seller),
        _ => None,
    };
    v.check(user_type.is_some(), "userType", "User type must be buyer or seller");
    v.finish()?;

    Ok(Registration {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password: req.password,
        phone: req.phone.trim().to_string(),
        user_type: user_type.unwrap_or(UserType::Buyer),
    })
}

fn images(input: Vec<ImageInput>) -> Vec<ProductImage> {
    if input.is_empty() {
        return vec![ProductImage::placeholder()];
    }
    input
        .into_iter()
        .map(|img| ProductImage {
            url: img
                .url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| ProductImage::placeholder().url),
            public_id: img.public_id,
            is_primary: img.is_primary.unwrap_or(false),
            kind: img.kind.unwrap_or_default(),
        })
        .collect()
}

fn tags(input: Vec<String>) -> Vec<String> {
    input
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn location(loc: ProductLocation) -> ProductLocation {
    ProductLocation {
        city: loc.city.trim().to_string(),
        district: loc.district.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        address: loc.address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
    }
}

fn category_data(value: Option<Value>, v: &mut Validator) -> Option<Value> {
    let value = value?;
    v.check(value.is_object(), "categoryData", "Category data must be an object");
    Some(value)
}

/// Validate a new listing and fill in defaults.
pub fn new_product(req: CreateProductRequest) -> Result<ProductDraft, ApiError> {
    let mut v = Validator::new();
    v.length("title", &req.title, 3, 100, "Title must be 3-100 characters")
        .length("description", &req.description, 10, 1000, "Description must be 10-1000 characters")
        .check(
            req.price.is_some_and(|p| p.is_finite() && p >= 0.0),
            "price",
            "Price must be a positive number",
        );
    let category = v.parse::<Category>("category", &req.category, "Invalid category");
    v.length("location.city", &req.location.city, 2, usize::MAX, "City is required");
    let currency = match req.currency.as_deref() {
        Some(c) => v.parse::<Currency>("currency", c, "Invalid currency"),
        None => Some(Currency::default()),
    };
    let unit = match req.unit.as_deref() {
        Some(u) => v.parse::<Unit>("unit", u, "Invalid unit"),
        None => Some(Unit::default()),
    };
    let stock = req.stock.unwrap_or(1);
    v.check(stock >= 0, "stock", "Stock cannot be negative");
    let category_data = category_data(req.category_data, &mut v);
    v.finish()?;

    let (Some(category), Some(currency), Some(unit), Some(price)) = (category, currency, unit, req.price) else {
        return Err(ApiError::bad_request("Validation failed"));
    };

    Ok(ProductDraft {
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        price,
        currency,
        category,
        images: images(req.images.unwrap_or_default()),
        location: location(req.location),
        is_available: req.is_available.unwrap_or(true),
        stock,
        unit,
        category_data: category_data.unwrap_or_else(|| Value::Object(Default::default())),
        tags: tags(req.tags.unwrap_or_default()),
    })
}

/// Validate a partial listing edit. Absent fields stay untouched.
pub fn product_update(req: UpdateProductRequest) -> Result<ProductUpdate, ApiError> {
    let mut v = Validator::new();
    if let Some(title) = &req.title {
        v.length("title", title, 3, 100, "Title must be 3-100 characters");
    }
    if let Some(description) = &req.description {
        v.length("description", description, 10, 1000, "Description must be 10-1000 characters");
    }
    if let Some(price) = req.price {
        v.check(price.is_finite() && price >= 0.0, "price", "Price must be a positive number");
    }
    let category = req
        .category
        .as_deref()
        .and_then(|c| v.parse::<Category>("category", c, "Invalid category"));
    let currency = req
        .currency
        .as_deref()
        .and_then(|c| v.parse::<Currency>("currency", c, "Invalid currency"));
    let unit = req.unit.as_deref().and_then(|u| v.parse::<Unit>("unit", u, "Invalid unit"));
    if let Some(loc) = &req.location {
        v.length("location.city", &loc.city, 2, usize::MAX, "City is required");
    }
    if let Some(stock) = req.stock {
        v.check(stock >= 0, "stock", "Stock cannot be negative");
    }
    let category_data = category_data(req.category_data, &mut v);
    v.finish()?;

    Ok(ProductUpdate {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description.map(|d| d.trim().to_string()),
        price: req.price,
        currency,
        category,
        images: req.images.map(images),
        location: req.location.map(location),
        is_available: req.is_available,
        stock: req.stock,
        unit,
        category_data,
        tags: req.tags.map(tags),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_request() -> CreateProductRequest {
        CreateProductRequest {
            title: "Salkım Domates".into(),
            description: "Antalya seralarından taze domates".into(),
            price: Some(18.5),
            currency: None,
            category: "sebze".into(),
            images: None,
            location: ProductLocation {
                city: " Antalya ".into(),
                district: Some("".into()),
                address: None,
            },
            stock: None,
            unit: Some("kasa".into()),
            category_data: None,
            tags: Some(vec![" sera ".into(), "".into()]),
            is_available: None,
        }
    }

    fn field_names(err: ApiError) -> Vec<String> {
        match err {
            ApiError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn phone_and_email_rules() {
        assert!(is_phone("+905321234567"));
        assert!(is_phone("05321234567"));
        assert!(!is_phone("0532 123 45 67"));
        assert!(!is_phone("12345"));
        assert!(is_email("ali@example.com"));
        assert!(!is_email("ali@example"));
    }

    #[test]
    fn new_product_fills_defaults() {
        let draft = new_product(product_request()).unwrap();
        assert_eq!(draft.currency, Currency::Tl);
        assert_eq!(draft.unit, Unit::Kasa);
        assert_eq!(draft.stock, 1);
        assert!(draft.is_available);
        assert_eq!(draft.location.city, "Antalya");
        assert_eq!(draft.location.district, None);
        assert_eq!(draft.tags, vec!["sera".to_string()]);
        assert_eq!(draft.images.len(), 1);
        assert!(draft.images[0].is_primary);
        assert!(draft.category_data.is_object());
    }

    #[test]
    fn new_product_reports_every_bad_field() {
        let mut req = product_request();
        req.title = "ab".into();
        req.price = Some(-1.0);
        req.category = "tahil".into();
        req.location.city = "".into();
        let fields = field_names(new_product(req).unwrap_err());
        assert_eq!(fields, vec!["title", "price", "category", "location.city"]);
    }

    #[test]
    fn missing_price_is_rejected() {
        let mut req = product_request();
        req.price = None;
        assert_eq!(field_names(new_product(req).unwrap_err()), vec!["price"]);
    }

    #[test]
    fn update_only_checks_present_fields() {
        let update = product_update(UpdateProductRequest {
            price: Some(20.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(update.price, Some(20.0));
        assert!(update.title.is_none());

        let err = product_update(UpdateProductRequest {
            description: Some("kısa".into()),
            unit: Some("bushel".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(field_names(err), vec!["description", "unit"]);
    }

    #[test]
    fn registration_normalizes_email() {
        let reg = registration(RegisterRequest {
            name: "Ayşe Yılmaz".into(),
            email: " Ayse@Example.COM ".into(),
            password: "secret1".into(),
            phone: "05321234567".into(),
            user_type: "seller".into(),
        })
        .unwrap();
        assert_eq!(reg.email, "ayse@example.com");
        assert_eq!(reg.user_type, UserType::Seller);

        let err = registration(RegisterRequest {
            name: "A".into(),
            email: "nope".into(),
            password: "123".into(),
            phone: "abc".into(),
            user_type: "admin".into(),
        })
        .unwrap_err();
        assert_eq!(field_names(err), vec!["name", "email", "password", "phone", "userType"]);
    }
}
