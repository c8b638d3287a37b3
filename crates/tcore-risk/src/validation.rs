//! Validation Framework (C8). `ValidatePlanUseCase` runs every validator to
//! completion — no short-circuit — so a caller always sees the full list of
//! problems with a plan rather than stopping at the first one.

use serde_json::json;
use tcore_schemas::{Decimal8, TenantId, ValidationStatus};

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: Option<String>,
    pub message: String,
    pub severity: ValidationStatus,
}

impl ValidationIssue {
    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue { field: Some(field.into()), message: message.into(), severity: ValidationStatus::Warning }
    }

    fn fail(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue { field: Some(field.into()), message: message.into(), severity: ValidationStatus::Fail }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub issues: Vec<ValidationIssue>,
    pub metadata: serde_json::Value,
}

impl ValidationReport {
    /// Derives `status` from `issues`: any FAIL forces FAIL, else any
    /// WARNING forces WARNING, else PASS.
    pub fn from_issues(issues: Vec<ValidationIssue>, metadata: serde_json::Value) -> Self {
        let status = if issues.iter().any(|i| i.severity == ValidationStatus::Fail) {
            ValidationStatus::Fail
        } else if issues.iter().any(|i| i.severity == ValidationStatus::Warning) {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Pass
        };
        ValidationReport { status, issues, metadata }
    }

    pub fn is_pass(&self) -> bool {
        self.status == ValidationStatus::Pass
    }

    pub fn to_dict(&self) -> serde_json::Value {
        json!({
            "status": match self.status {
                ValidationStatus::Pass => "PASS",
                ValidationStatus::Warning => "WARNING",
                ValidationStatus::Fail => "FAIL",
            },
            "issues": self.issues.iter().map(|i| json!({
                "field": i.field,
                "message": i.message,
                "severity": match i.severity {
                    ValidationStatus::Pass => "PASS",
                    ValidationStatus::Warning => "WARNING",
                    ValidationStatus::Fail => "FAIL",
                },
            })).collect::<Vec<_>>(),
            "metadata": self.metadata,
        })
    }

    pub fn to_human_readable(&self) -> String {
        if self.issues.is_empty() {
            return format!("[{:?}] no issues", self.status);
        }
        let lines: Vec<String> = self
            .issues
            .iter()
            .map(|i| format!("  [{:?}] {}: {}", i.severity, i.field.as_deref().unwrap_or("-"), i.message))
            .collect();
        format!("[{:?}]\n{}", self.status, lines.join("\n"))
    }
}

#[derive(Debug, Clone)]
pub struct PlanContext {
    pub tenant_id: TenantId,
    pub risk_config: serde_json::Value,
    pub operation_type: String,
    pub symbol: String,
    pub quantity: Decimal8,
}

fn tenant_isolation_validator(ctx: &PlanContext, issues: &mut Vec<ValidationIssue>) {
    if ctx.tenant_id <= 0 {
        issues.push(ValidationIssue::fail("tenant_id", "tenant_id must be a positive integer"));
    }
}

fn risk_configuration_validator(ctx: &PlanContext, issues: &mut Vec<ValidationIssue>) {
    match ctx.risk_config.get("max_drawdown_percent").and_then(|v| v.as_f64()) {
        None => issues.push(ValidationIssue::warning(
            "max_drawdown_percent",
            "not configured; falling back to the default",
        )),
        Some(v) if !(0.0..=100.0).contains(&v) => {
            issues.push(ValidationIssue::fail("max_drawdown_percent", format!("out of range: {v}")));
        }
        _ => {}
    }

    match ctx.risk_config.get("stop_loss_percent").and_then(|v| v.as_f64()) {
        None => issues.push(ValidationIssue::warning(
            "stop_loss_percent",
            "not configured; falling back to the default",
        )),
        Some(v) if v <= 0.0 => {
            issues.push(ValidationIssue::fail("stop_loss_percent", format!("must be positive: {v}")));
        }
        _ => {}
    }
}

fn operation_validator(ctx: &PlanContext, issues: &mut Vec<ValidationIssue>) {
    if ctx.operation_type.trim().is_empty() {
        issues.push(ValidationIssue::fail("operation_type", "operation_type is required"));
    }
    if ctx.symbol.trim().is_empty() {
        issues.push(ValidationIssue::fail("symbol", "symbol is required"));
    }
    if ctx.quantity.is_zero() || ctx.quantity.to_f64() < 0.0 {
        issues.push(ValidationIssue::fail("quantity", "quantity must be greater than zero"));
    }
}

pub struct ValidatePlanUseCase;

impl ValidatePlanUseCase {
    pub fn execute(ctx: &PlanContext) -> ValidationReport {
        let mut issues = Vec::new();
        tenant_isolation_validator(ctx, &mut issues);
        risk_configuration_validator(ctx, &mut issues);
        operation_validator(ctx, &mut issues);
        ValidationReport::from_issues(issues, json!({ "symbol": ctx.symbol, "tenant_id": ctx.tenant_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> PlanContext {
        PlanContext {
            tenant_id: 1,
            risk_config: json!({ "max_drawdown_percent": 4.0, "stop_loss_percent": 2.0 }),
            operation_type: "SPOT".to_string(),
            symbol: "BTCUSDC".to_string(),
            quantity: Decimal8::from_f64(0.01),
        }
    }

    #[test]
    fn clean_plan_passes() {
        let report = ValidatePlanUseCase::execute(&base_ctx());
        assert!(report.is_pass());
    }

    #[test]
    fn non_positive_tenant_fails() {
        let mut ctx = base_ctx();
        ctx.tenant_id = 0;
        let report = ValidatePlanUseCase::execute(&ctx);
        assert_eq!(report.status, ValidationStatus::Fail);
    }

    #[test]
    fn all_validators_run_to_completion() {
        let mut ctx = base_ctx();
        ctx.tenant_id = -1;
        ctx.operation_type = String::new();
        ctx.quantity = Decimal8::ZERO;
        let report = ValidatePlanUseCase::execute(&ctx);
        assert_eq!(report.status, ValidationStatus::Fail);
        // tenant + operation_type + symbol-not-empty(ok) + quantity => at least 3 fail issues
        let fail_count = report.issues.iter().filter(|i| i.severity == ValidationStatus::Fail).count();
        assert!(fail_count >= 3);
    }

    #[test]
    fn missing_risk_config_warns_not_fails() {
        let mut ctx = base_ctx();
        ctx.risk_config = json!({});
        let report = ValidatePlanUseCase::execute(&ctx);
        assert_eq!(report.status, ValidationStatus::Warning);
    }
}
