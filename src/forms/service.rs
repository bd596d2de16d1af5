//! Service offer editor: validated form input and the user's draft list.

use log::{info, warn};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::forms::{require, FieldError, ValidationErrors};
use crate::gateway::data::service_changes;
use crate::gateway::DataGateway;
use crate::models::{Category, NewService, Service, Subcategory};
use crate::notify::Notifier;

/// Raw input of the "add service" form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceForm {
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub description: String,
    pub rate: String,
    pub currency: String,
}

/// Form input that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidService {
    pub category_id: i64,
    pub subcategory_id: i64,
    pub description: String,
    pub rate: f64,
    /// Upper-case ISO 4217 style code.
    pub currency: String,
}

impl ServiceForm {
    /// Check every field and report all failures at once.
    pub fn validate(&self) -> std::result::Result<ValidService, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.category_id.is_none() {
            errors.push(FieldError::Missing("category"));
        }
        if self.subcategory_id.is_none() {
            errors.push(FieldError::Missing("subcategory"));
        }
        require(&mut errors, "description", &self.description);

        let mut rate = None;
        if require(&mut errors, "rate", &self.rate) {
            match self.rate.trim().parse::<f64>() {
                Ok(value) if !value.is_finite() => errors.push(FieldError::InvalidRate),
                Ok(value) if value < 0.0 => errors.push(FieldError::NegativeRate),
                Ok(value) => rate = Some(value),
                Err(_) => errors.push(FieldError::InvalidRate),
            }
        }

        let currency = self.currency.trim().to_ascii_uppercase();
        if require(&mut errors, "currency", &currency)
            && (currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()))
        {
            errors.push(FieldError::InvalidCurrency);
        }

        match (self.category_id, self.subcategory_id, rate) {
            (Some(category_id), Some(subcategory_id), Some(rate)) if errors.is_empty() => {
                Ok(ValidService {
                    category_id,
                    subcategory_id,
                    description: self.description.trim().to_string(),
                    rate,
                    currency,
                })
            }
            _ => Err(errors),
        }
    }
}

/// One entry of the draft list. `id` is set once the entry is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDraft {
    pub id: Option<i64>,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub category_name: Option<String>,
    pub subcategory_name: Option<String>,
    pub description: String,
    pub rate: f64,
    pub currency: String,
}

impl From<Service> for ServiceDraft {
    fn from(service: Service) -> Self {
        Self {
            id: Some(service.id),
            category_id: service.category_id,
            subcategory_id: service.subcategory_id,
            category_name: service.category_name().map(str::to_string),
            subcategory_name: service.subcategory_name().map(str::to_string),
            description: service.description,
            rate: service.rate,
            currency: service.currency,
        }
    }
}

impl ServiceDraft {
    fn to_new_service(&self, user_id: &str) -> NewService {
        NewService {
            user_id: user_id.to_string(),
            category_id: self.category_id,
            subcategory_id: self.subcategory_id,
            description: self.description.clone(),
            rate: self.rate,
            currency: self.currency.clone(),
        }
    }
}

/// Resolve names for a validated entry against the loaded reference lists.
fn resolve(
    service: ValidService,
    categories: &[Category],
    subcategories: &[Subcategory],
) -> std::result::Result<ServiceDraft, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let category = categories.iter().find(|c| c.id == service.category_id);
    if category.is_none() {
        errors.push(FieldError::UnknownOption("category"));
    }
    let subcategory = subcategories
        .iter()
        .find(|s| s.id == service.subcategory_id && s.category_id == service.category_id);
    if subcategory.is_none() {
        errors.push(FieldError::UnknownOption("subcategory"));
    }
    errors.into_result()?;

    Ok(ServiceDraft {
        id: None,
        category_id: service.category_id,
        subcategory_id: service.subcategory_id,
        category_name: category.map(|c| c.name.clone()),
        subcategory_name: subcategory.map(|s| s.name.clone()),
        description: service.description,
        rate: service.rate,
        currency: service.currency,
    })
}

/// Outcome of [`ServiceEditor::save_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    pub saved: usize,
    /// Draft index and message for every entry that failed.
    pub failures: Vec<(usize, String)>,
}

/// The signed-in user's list of service offers.
pub struct ServiceEditor {
    data: Arc<DataGateway>,
    notifier: Notifier,
    user_id: String,
    drafts: Vec<ServiceDraft>,
}

impl ServiceEditor {
    pub fn new(data: Arc<DataGateway>, notifier: Notifier, user_id: &str) -> Self {
        Self {
            data,
            notifier,
            user_id: user_id.to_string(),
            drafts: Vec::new(),
        }
    }

    pub fn drafts(&self) -> &[ServiceDraft] {
        &self.drafts
    }

    /// Replace the drafts with the user's stored services.
    pub async fn load(&mut self) -> Result<()> {
        match self.data.list_services_by_user(&self.user_id).await {
            Ok(services) => {
                self.drafts = services.into_iter().map(ServiceDraft::from).collect();
                Ok(())
            }
            Err(err) => {
                self.notifier.error(err.user_message());
                Err(err)
            }
        }
    }

    /// Append a validated, not yet stored entry.
    pub fn add_draft(
        &mut self,
        form: &ServiceForm,
        categories: &[Category],
        subcategories: &[Subcategory],
    ) -> Result<&ServiceDraft> {
        let draft = form
            .validate()
            .and_then(|service| resolve(service, categories, subcategories))
            .map_err(|errors| self.reject(errors))?;

        self.drafts.push(draft);
        Ok(&self.drafts[self.drafts.len() - 1])
    }

    /// Validate, store and append one entry.
    pub async fn submit(
        &mut self,
        form: &ServiceForm,
        categories: &[Category],
        subcategories: &[Subcategory],
    ) -> Result<&ServiceDraft> {
        let mut draft = form
            .validate()
            .and_then(|service| resolve(service, categories, subcategories))
            .map_err(|errors| self.reject(errors))?;

        let created = self
            .data
            .create_service(&draft.to_new_service(&self.user_id))
            .await;
        match created {
            Ok(service) => {
                info!("service {} created", service.id);
                draft.id = Some(service.id);
                self.drafts.push(draft);
                self.notifier.success("Service added");
                Ok(&self.drafts[self.drafts.len() - 1])
            }
            Err(err) => {
                self.notifier.error(err.user_message());
                Err(err)
            }
        }
    }

    /// Store every draft: new entries are inserted, stored ones updated.
    pub async fn save_all(&mut self) -> SaveReport {
        let mut report = SaveReport::default();

        for (index, draft) in self.drafts.iter_mut().enumerate() {
            let payload = draft.to_new_service(&self.user_id);
            let result = match draft.id {
                Some(id) => self.data.update_service(id, &service_changes(&payload)).await,
                None => self.data.create_service(&payload).await,
            };

            match result {
                Ok(service) => {
                    draft.id = Some(service.id);
                    report.saved += 1;
                }
                Err(err) => {
                    warn!("saving service draft {} failed: {}", index, err);
                    report.failures.push((index, err.user_message()));
                }
            }
        }

        if report.failures.is_empty() {
            self.notifier.success("Services saved");
        } else {
            self.notifier.error(format!(
                "{} of {} services could not be saved",
                report.failures.len(),
                self.drafts.len()
            ));
        }
        report
    }

    /// Remove the draft at `index`, deleting it from the backend if stored.
    pub async fn remove(&mut self, index: usize) -> Result<ServiceDraft> {
        let id = match self.drafts.get(index) {
            Some(draft) => draft.id,
            None => return Err(Error::general(format!("no service draft at {}", index))),
        };

        if let Some(id) = id {
            if let Err(err) = self.data.delete_service(id).await {
                self.notifier.error(err.user_message());
                return Err(err);
            }
            self.notifier.success("Service removed");
        }
        Ok(self.drafts.remove(index))
    }

    fn reject(&self, errors: ValidationErrors) -> Error {
        self.notifier.error(errors.to_string());
        Error::Validation(errors)
    }
}
