use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{GroupRule, PolicyRule};
use crate::models::identity::{
    Identity, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse,
};
use crate::models::menu::{MenuCreateRequest, MenuNode};
use crate::routes;
use crate::tree::MenuTreeNode;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::login,
        routes::auth::logout,
        routes::auth::refresh,
        routes::auth::me,
        routes::menus::user_menu_tree,
        routes::menus::full_menu_tree,
        routes::menus::create_menu,
        routes::menus::delete_menu,
        routes::policies::list_rules,
        routes::policies::add_rule,
        routes::policies::add_rules,
        routes::policies::remove_rule,
        routes::policies::remove_rules,
        routes::policies::remove_rules_for_subject,
        routes::policies::list_group_rules,
        routes::policies::add_group_rule,
        routes::policies::add_group_rules,
        routes::policies::remove_group_rule,
        routes::policies::remove_group_rules_for_member,
        routes::health::health
    ),
    components(schemas(
        Identity,
        LoginRequest,
        LoginResponse,
        RefreshRequest,
        RefreshResponse,
        MenuNode,
        MenuCreateRequest,
        MenuTreeNode,
        PolicyRule,
        GroupRule,
        routes::auth::MessageResponse,
        routes::policies::CountResponse,
        routes::health::HealthResponse
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Login, logout and token rotation"),
        (name = "Menus", description = "Menu tree management"),
        (name = "Policies", description = "Permission and group rule management"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_routes() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
