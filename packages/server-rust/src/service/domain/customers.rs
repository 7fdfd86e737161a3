use async_trait::async_trait;
use cartline_core::{Capabilities, Created, Error, Outcome, Request, Violation, Violations};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::store::{CommerceStore, Customer};
use crate::service::handler::Handler;

pub const CUSTOMER_ID_REQUIRED: &str = "Customer.IdRequired";
pub const CUSTOMER_NAME_REQUIRED: &str = "Customer.NameRequired";
pub const CUSTOMER_INVALID_EMAIL: &str = "Customer.InvalidEmail";
pub const CUSTOMER_ALREADY_EXISTS: &str = "Customer.AlreadyExists";
pub const CUSTOMER_NOT_FOUND: &str = "Customer.NotFound";

pub(crate) fn customer_not_found(customer_id: &str) -> Error {
    Error::not_found(
        CUSTOMER_NOT_FOUND,
        format!("customer {customer_id} does not exist"),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub customer_id: String,
    pub name: String,
    pub email: String,
}

impl Request for RegisterCustomer {
    type Output = Created;
    const NAME: &'static str = "RegisterCustomer";
    const CAPABILITIES: Capabilities = Capabilities::COMMAND;
}

#[must_use]
pub fn validate_register_customer(request: &RegisterCustomer) -> Vec<Violation> {
    let mut v = Violations::new();
    v.require(&request.customer_id, CUSTOMER_ID_REQUIRED, "customer id is required")
        .require(&request.name, CUSTOMER_NAME_REQUIRED, "customer name is required")
        .ensure(
            is_plausible_email(&request.email),
            CUSTOMER_INVALID_EMAIL,
            "email must look like name@domain",
        );
    v.into_vec()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}

#[async_trait]
impl Handler<RegisterCustomer> for CommerceStore {
    async fn handle(
        &self,
        request: &RegisterCustomer,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Created>> {
        use dashmap::mapref::entry::Entry;

        match self.customers.entry(request.customer_id.clone()) {
            Entry::Occupied(_) => Ok(Outcome::failure(Error::conflict(
                CUSTOMER_ALREADY_EXISTS,
                format!("customer {} is already registered", request.customer_id),
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Customer {
                    id: request.customer_id.clone(),
                    name: request.name.clone(),
                    email: request.email.clone(),
                });
                tracing::info!(customer_id = %request.customer_id, "customer registered");
                Ok(Outcome::success(Created))
            }
        }
    }
}
