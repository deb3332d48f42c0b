pub mod admin;
pub mod auth;
pub mod conversations;
pub mod error;
pub mod gateway;
pub mod health;
pub mod locations;
pub mod mailer;
pub mod market_reports;
pub mod middleware;
pub mod notifications;
pub mod notify;
pub mod orders;
pub mod pagination;
pub mod products;
pub mod upload;
pub mod users;
pub mod validate;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};

use crate::auth::AppState;
use crate::middleware::{require_admin, require_auth};

/// Every REST route plus the gateway, mounted under `/api`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/users/sellers", get(users::list_sellers))
        .route("/users/sellers/{id}", get(users::get_seller))
        .route("/products", get(products::list_products))
        .route("/products/featured", get(products::featured_products))
        .route("/products/categories", get(products::categories))
        .route("/products/{id}", get(products::get_product))
        .route("/products/{id}/views", put(products::increment_views))
        .route("/categories", get(products::categories))
        .route("/locations/cities", get(locations::list_cities))
        .route("/locations/districts", get(locations::districts_by_city_name))
        .route("/locations/cities/{id}/districts", get(locations::city_districts))
        .route("/market-reports", get(market_reports::list_reports))
        .route("/market-reports/cities/list", get(market_reports::report_cities))
        .route("/market-reports/{id}", get(market_reports::get_report))
        .route("/gateway", get(gateway::ws_handler));

    let upload_routes = Router::new()
        .route("/upload/image", post(upload::upload_image))
        .route("/upload/images", post(upload::upload_images))
        .route("/upload/profile-image", post(upload::upload_profile_image))
        .layer(DefaultBodyLimit::max(upload::MAX_REQUEST_SIZE));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/users/profile", get(users::get_profile).put(users::update_profile))
        .route("/users/profile-image", put(users::update_profile_image))
        .route("/users/switch-role", post(users::switch_role))
        .route("/users/account", delete(users::deactivate_account))
        .route("/products", post(products::create_product))
        .route("/products/favorites", get(products::favorite_products))
        .route("/products/seller/my-products", get(products::my_products))
        .route("/products/seller/count", get(products::my_product_counts))
        .route("/products/{id}", put(products::update_product).delete(products::delete_product))
        .route(
            "/products/{id}/favorite",
            post(products::toggle_favorite).delete(products::remove_favorite),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/notifications/{id}/read", put(notifications::mark_read))
        .route("/notifications/{id}", delete(notifications::delete_notification))
        .route("/notifications/product-request", post(notifications::create_product_request))
        .route("/notifications/product-requests", get(notifications::list_product_requests))
        .route(
            "/notifications/product-requests/{id}",
            delete(notifications::delete_product_request),
        )
        .route(
            "/notifications/request-products/{id}",
            get(notifications::request_products),
        )
        .route("/notifications/grouped-products", get(notifications::grouped_products))
        .route("/orders", get(orders::buyer_orders).post(orders::create_order))
        .route("/orders/seller", get(orders::seller_orders))
        .route("/orders/{id}", get(orders::get_order).delete(orders::cancel_order))
        .route("/orders/{id}/status", put(orders::update_status))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::start_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(conversations::get_messages).post(conversations::send_message),
        )
        .route("/conversations/{id}/read", put(conversations::mark_read))
        .merge(upload_routes);

    let admin_routes = Router::new()
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/products", get(admin::list_products))
        .route("/admin/products/pending", get(admin::pending_products))
        .route("/admin/products/rejected", get(admin::rejected_products))
        .route("/admin/products/featured", get(admin::featured_products))
        .route("/admin/products/{id}", delete(admin::delete_product))
        .route("/admin/products/{id}/approve", put(admin::approve_product))
        .route("/admin/products/{id}/reject", put(admin::reject_product))
        .route("/admin/products/{id}/featured", put(admin::toggle_featured))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/search", get(admin::search_users))
        .route("/admin/users/{id}", delete(admin::delete_user))
        .route("/admin/users/{id}/block", put(admin::block_user))
        .route("/admin/users/{id}/products", get(admin::user_products))
        .route("/market-reports", post(market_reports::create_report))
        .route("/market-reports/admin/all", get(market_reports::admin_list_reports))
        .route(
            "/market-reports/{id}",
            put(market_reports::update_report).delete(market_reports::delete_report),
        )
        .layer(DefaultBodyLimit::max(upload::MAX_UPLOAD_SIZE))
        .route_layer(from_fn(require_admin));

    let authenticated = protected_routes
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = Router::new().merge(public_routes).merge(authenticated).with_state(state);
    Router::new().nest("/api", api)
}
