//! Employee administration.

use agency_core::capability::Capability;
use agency_core::employee::{CreateEmployee, Employee, UpdateEmployee};
use agency_core::error::CoreError;
use agency_core::types::DbId;

use crate::{Actor, Engine};

impl Engine {
    pub async fn get_employee(&self, id: DbId) -> Result<Employee, CoreError> {
        self.stores
            .employees
            .find_by_id(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "employee",
                id,
            })
    }

    pub async fn list_employees(&self) -> Result<Vec<Employee>, CoreError> {
        Ok(self.stores.employees.list().await?)
    }

    pub async fn list_active_employees(&self) -> Result<Vec<Employee>, CoreError> {
        Ok(self.stores.employees.list_active().await?)
    }

    pub async fn create_employee(
        &self,
        actor: &Actor,
        mut input: CreateEmployee,
    ) -> Result<Employee, CoreError> {
        actor.require(Capability::ManageEmployees)?;
        input.validate_and_normalize()?;
        let employee = self.stores.employees.create(&input).await?;
        tracing::info!(employee_id = employee.id, user_id = employee.user_id, "Employee created");
        Ok(employee)
    }

    /// HR edits. Workload and project counters are owned by the ledger and
    /// cannot be set here.
    pub async fn update_employee(
        &self,
        actor: &Actor,
        id: DbId,
        mut input: UpdateEmployee,
    ) -> Result<Employee, CoreError> {
        actor.require(Capability::ManageEmployees)?;
        input.validate_and_normalize()?;
        let employee = self
            .stores
            .employees
            .update(id, &input)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "employee",
                id,
            })?;
        tracing::info!(employee_id = id, "Employee updated");
        Ok(employee)
    }
}
