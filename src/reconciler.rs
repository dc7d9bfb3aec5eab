// ⚖️ Category Reconciler - normalize every product's category in one pass
//
// For each product, in datastore order:
//   empty label        -> looked up as "General"
//   mapped label       -> mapping target (no write when target == current)
//   unmapped "General" -> default category
//   anything else      -> kept
//
// Writes are independent: a failed write is logged and recorded, and the
// batch moves on. Only a failed listing aborts the run, before any write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::{info, info_span, warn};

use crate::db::Product;
use crate::error::ReconcileError;
use crate::repository::ProductRepository;
use crate::taxonomy::CategoryMapping;

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryOutcome {
    /// Category changed (or would change, in a dry run)
    Updated { from: String, to: String },

    /// Category already final, nothing written
    Unchanged { category: String },

    /// The write for this product failed; its stored category is still `from`
    Failed {
        from: String,
        to: String,
        error: String,
    },
}

impl CategoryOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, CategoryOutcome::Updated { .. })
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, CategoryOutcome::Unchanged { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CategoryOutcome::Failed { .. })
    }

    /// Category the product carries after the pass
    pub fn final_category(&self) -> &str {
        match self {
            CategoryOutcome::Updated { to, .. } => to.as_str(),
            CategoryOutcome::Unchanged { category } => category.as_str(),
            CategoryOutcome::Failed { from, .. } => from.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductOutcome {
    pub product_id: String,
    pub product_name: String,
    pub outcome: CategoryOutcome,
}

/// Category change computed for one product, before any write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedChange {
    pub product_id: String,
    pub product_name: String,
    pub from: String,
    pub to: String,
}

impl PlannedChange {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// Compute the final category of every product without touching the datastore
pub fn plan(products: &[Product], mapping: &CategoryMapping) -> Vec<PlannedChange> {
    products
        .iter()
        .map(|product| {
            let current = product.category_label();
            PlannedChange {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                from: current.to_string(),
                to: mapping.resolve(current).to_string(),
            }
        })
        .collect()
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub outcomes: Vec<ProductOutcome>,
    pub total_processed: usize,
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub failed_count: usize,
    /// Products per category after the pass
    pub distribution: HashMap<String, usize>,
    pub default_category: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconciliationReport {
    fn from_outcomes(
        outcomes: Vec<ProductOutcome>,
        default_category: &str,
        dry_run: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut distribution: HashMap<String, usize> = HashMap::new();
        for item in &outcomes {
            *distribution
                .entry(item.outcome.final_category().to_string())
                .or_insert(0) += 1;
        }

        ReconciliationReport {
            total_processed: outcomes.len(),
            updated_count: outcomes.iter().filter(|o| o.outcome.is_updated()).count(),
            unchanged_count: outcomes.iter().filter(|o| o.outcome.is_unchanged()).count(),
            failed_count: outcomes.iter().filter(|o| o.outcome.is_failed()).count(),
            distribution,
            default_category: default_category.to_string(),
            dry_run,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    /// updated + unchanged + failed accounts for every processed product
    pub fn is_consistent(&self) -> bool {
        self.updated_count + self.unchanged_count + self.failed_count == self.total_processed
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count > 0
    }

    /// Distribution ordered by count (descending), then label
    pub fn sorted_distribution(&self) -> Vec<(&str, usize)> {
        let mut rows: Vec<(&str, usize)> = self
            .distribution
            .iter()
            .map(|(label, count)| (label.as_str(), *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }

    pub fn summary(&self) -> String {
        format!(
            "{}{} products processed: {} updated, {} unchanged, {} failed",
            if self.dry_run { "[dry run] " } else { "" },
            self.total_processed,
            self.updated_count,
            self.unchanged_count,
            self.failed_count
        )
    }

    /// Console report: every transition, the counts, then the final distribution
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "━".repeat(60);

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "🏷️  Category reconciliation{}",
            if self.dry_run { " (dry run, nothing written)" } else { "" }
        );
        let _ = writeln!(out, "{}", rule);

        for item in &self.outcomes {
            match &item.outcome {
                CategoryOutcome::Updated { from, to } => {
                    let _ = writeln!(
                        out,
                        "  ✓ {} [{}]: {} → {}",
                        item.product_name,
                        item.product_id,
                        display_label(from),
                        to
                    );
                }
                CategoryOutcome::Unchanged { category } => {
                    let _ = writeln!(
                        out,
                        "  = {} [{}]: {} (unchanged)",
                        item.product_name,
                        item.product_id,
                        display_label(category)
                    );
                }
                CategoryOutcome::Failed { from, to, error } => {
                    let _ = writeln!(
                        out,
                        "  ✗ {} [{}]: {} → {} failed: {}",
                        item.product_name,
                        item.product_id,
                        display_label(from),
                        to,
                        error
                    );
                }
            }
        }

        let _ = writeln!(out, "\n📊 {}", self.summary());
        let _ = writeln!(out, "   Default category: {}", self.default_category);

        let _ = writeln!(out, "\n📂 Final distribution:");
        for (label, count) in self.sorted_distribution() {
            let _ = writeln!(out, "   {:<24} {:>6}", display_label(label), count);
        }

        out
    }
}

fn display_label(label: &str) -> &str {
    if label.is_empty() {
        "(empty)"
    } else {
        label
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct CategoryReconciler {
    mapping: CategoryMapping,
}

impl CategoryReconciler {
    pub fn new(mapping: CategoryMapping) -> Self {
        CategoryReconciler { mapping }
    }

    /// List every product, write each changed category, report the outcome
    pub fn reconcile<R: ProductRepository + ?Sized>(
        &self,
        repo: &R,
    ) -> Result<ReconciliationReport, ReconcileError> {
        self.run(repo, false)
    }

    /// Same pass as `reconcile`, but never writes
    pub fn dry_run<R: ProductRepository + ?Sized>(
        &self,
        repo: &R,
    ) -> Result<ReconciliationReport, ReconcileError> {
        self.run(repo, true)
    }

    fn run<R: ProductRepository + ?Sized>(
        &self,
        repo: &R,
        dry_run: bool,
    ) -> Result<ReconciliationReport, ReconcileError> {
        let span = info_span!("reconcile_categories", dry_run);
        let _enter = span.enter();
        let started_at = Utc::now();

        let products = repo.list_products().map_err(ReconcileError::FatalRead)?;
        info!(products = products.len(), mappings = self.mapping.len(), "reconciliation started");

        let mut outcomes = Vec::with_capacity(products.len());

        for change in plan(&products, &self.mapping) {
            let outcome = if !change.is_change() {
                CategoryOutcome::Unchanged { category: change.from }
            } else if dry_run {
                CategoryOutcome::Updated { from: change.from, to: change.to }
            } else {
                match repo.update_category(&change.product_id, &change.to) {
                    Ok(()) => {
                        info!(
                            id = %change.product_id,
                            name = %change.product_name,
                            from = %change.from,
                            to = %change.to,
                            "category updated"
                        );
                        CategoryOutcome::Updated { from: change.from, to: change.to }
                    }
                    Err(e) => {
                        warn!(
                            id = %change.product_id,
                            name = %change.product_name,
                            error = %e,
                            "category update failed, skipping"
                        );
                        CategoryOutcome::Failed {
                            from: change.from,
                            to: change.to,
                            error: e.to_string(),
                        }
                    }
                }
            };

            outcomes.push(ProductOutcome {
                product_id: change.product_id,
                product_name: change.product_name,
                outcome,
            });
        }

        let report = ReconciliationReport::from_outcomes(
            outcomes,
            self.mapping.default_category(),
            dry_run,
            started_at,
        );

        info!(
            total = report.total_processed,
            updated = report.updated_count,
            unchanged = report.unchanged_count,
            failed = report.failed_count,
            "reconciliation finished"
        );

        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryProductRepository;
    use std::collections::BTreeMap;

    fn product(id: &str, name: &str, category: Option<&str>) -> Product {
        let mut p = Product::new(name, category);
        p.id = id.to_string();
        p
    }

    fn mapping(pairs: &[(&str, &str)], default: &str) -> CategoryMapping {
        let table: BTreeMap<String, String> = pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        CategoryMapping::new(table, default).unwrap()
    }

    fn reconcile(products: Vec<Product>, m: CategoryMapping) -> (ReconciliationReport, InMemoryProductRepository) {
        let repo = InMemoryProductRepository::with_products(products);
        let report = CategoryReconciler::new(m).reconcile(&repo).unwrap();
        (report, repo)
    }

    #[test]
    fn test_mapped_label_is_updated() {
        let (report, repo) = reconcile(
            vec![product("1", "Playera", Some("Ropa"))],
            mapping(&[("Ropa", "Moda")], "Oficina"),
        );

        assert_eq!(
            report.outcomes[0].outcome,
            CategoryOutcome::Updated { from: "Ropa".into(), to: "Moda".into() }
        );
        assert_eq!(repo.get("1").unwrap().category.as_deref(), Some("Moda"));
    }

    #[test]
    fn test_target_label_without_key_is_unchanged() {
        let (report, _) = reconcile(
            vec![product("1", "Sudadera", Some("Moda"))],
            mapping(&[("Ropa", "Moda")], "Oficina"),
        );

        assert_eq!(
            report.outcomes[0].outcome,
            CategoryOutcome::Unchanged { category: "Moda".into() }
        );
    }

    #[test]
    fn test_empty_and_absent_fall_back_to_default() {
        let (report, repo) = reconcile(
            vec![
                product("1", "Pluma", Some("")),
                product("2", "Lápiz", None),
                product("3", "Clip", Some("General")),
            ],
            mapping(&[("Ropa", "Moda")], "Oficina"),
        );

        assert_eq!(report.updated_count, 3);
        for id in ["1", "2", "3"] {
            assert_eq!(repo.get(id).unwrap().category.as_deref(), Some("Oficina"));
        }
        assert_eq!(
            report.outcomes[0].outcome,
            CategoryOutcome::Updated { from: "".into(), to: "Oficina".into() }
        );
    }

    #[test]
    fn test_identity_mapping_is_unchanged() {
        let (report, _) = reconcile(
            vec![product("1", "Audífonos", Some("Tecnología"))],
            mapping(&[("Tecnología", "Tecnología")], "Oficina"),
        );

        assert_eq!(report.updated_count, 0);
        assert_eq!(report.unchanged_count, 1);
    }

    #[test]
    fn test_unmapped_label_passes_through() {
        let (report, repo) = reconcile(
            vec![product("1", "Especial", Some("CustomLabel"))],
            mapping(&[("Ropa", "Moda")], "Oficina"),
        );

        assert!(report.outcomes[0].outcome.is_unchanged());
        assert_eq!(repo.get("1").unwrap().category.as_deref(), Some("CustomLabel"));
    }

    #[test]
    fn test_mixed_batch_counts_and_distribution() {
        let (report, _) = reconcile(
            vec![
                product("1", "Playera", Some("Ropa")),
                product("2", "Sudadera", Some("Moda")),
                product("3", "Pluma", Some("")),
            ],
            mapping(&[("Ropa", "Moda")], "Oficina"),
        );

        assert_eq!(report.total_processed, 3);
        assert_eq!(report.updated_count, 2);
        assert_eq!(report.unchanged_count, 1);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.updated_count + report.unchanged_count, report.total_processed);
        assert_eq!(report.distribution.get("Moda"), Some(&2));
        assert_eq!(report.distribution.get("Oficina"), Some(&1));
        assert_eq!(report.sorted_distribution(), vec![("Moda", 2), ("Oficina", 1)]);
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let products = vec![
            product("1", "Playera", Some("Ropa")),
            product("2", "Taza", Some("Tazas")),
            product("3", "Sin categoría", None),
            product("4", "Especial", Some("CustomLabel")),
            product("5", "Genérico", Some("General")),
        ];
        let repo = InMemoryProductRepository::with_products(products);
        let reconciler = CategoryReconciler::new(CategoryMapping::builtin());

        let first = reconciler.reconcile(&repo).unwrap();
        let second = reconciler.reconcile(&repo).unwrap();

        assert_eq!(first.updated_count, 4);
        assert_eq!(second.updated_count, 0, "second pass must be a no-op");
        assert_eq!(second.unchanged_count, 5);
        assert!(repo
            .snapshot()
            .iter()
            .all(|p| !p.category_label().is_empty()));
    }

    #[test]
    fn test_write_failure_does_not_abort_batch() {
        let repo = InMemoryProductRepository::with_products(vec![
            product("1", "Playera", Some("Ropa")),
            product("2", "Gorra", Some("Ropa")),
            product("3", "Sudadera", Some("Moda")),
        ]);
        repo.fail_writes_for("1");

        let report = CategoryReconciler::new(mapping(&[("Ropa", "Moda")], "Oficina"))
            .reconcile(&repo)
            .unwrap();

        assert_eq!(report.total_processed, 3);
        assert_eq!(report.updated_count, 1);
        assert_eq!(report.unchanged_count, 1);
        assert_eq!(report.failed_count, 1);
        assert!(report.is_consistent());
        assert!(report.outcomes[0].outcome.is_failed());
        assert_eq!(repo.get("1").unwrap().category.as_deref(), Some("Ropa"));
        assert_eq!(repo.get("2").unwrap().category.as_deref(), Some("Moda"));
        assert_eq!(report.distribution.get("Ropa"), Some(&1));
        assert_eq!(report.distribution.get("Moda"), Some(&2));
    }

    #[test]
    fn test_listing_failure_is_fatal() {
        let repo = InMemoryProductRepository::with_products(vec![product("1", "Playera", Some("Ropa"))]);
        repo.fail_listing();

        let result = CategoryReconciler::new(CategoryMapping::builtin()).reconcile(&repo);

        assert!(matches!(result, Err(ReconcileError::FatalRead(_))));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let repo = InMemoryProductRepository::with_products(vec![
            product("1", "Playera", Some("Ropa")),
            product("2", "Pluma", None),
        ]);

        let report = CategoryReconciler::new(CategoryMapping::builtin())
            .dry_run(&repo)
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.updated_count, 2);
        assert_eq!(repo.get("1").unwrap().category.as_deref(), Some("Ropa"));
        assert_eq!(repo.get("2").unwrap().category, None);
        assert!(report.summary().starts_with("[dry run]"));
    }

    #[test]
    fn test_plan_preserves_order() {
        let products = vec![
            product("b", "Segundo", Some("Tazas")),
            product("a", "Primero", Some("Moda")),
        ];

        let changes = plan(&products, &CategoryMapping::builtin());

        assert_eq!(changes[0].product_id, "b");
        assert_eq!(changes[0].to, "Bebidas");
        assert!(changes[0].is_change());
        assert!(!changes[1].is_change());
    }

    #[test]
    fn test_render_lists_every_transition() {
        let (report, _) = reconcile(
            vec![
                product("1", "Playera", Some("Ropa")),
                product("2", "Pluma", None),
                product("3", "Sudadera", Some("Moda")),
            ],
            mapping(&[("Ropa", "Moda")], "Oficina"),
        );

        let text = report.render();

        assert!(text.contains("Playera [1]: Ropa → Moda"));
        assert!(text.contains("Pluma [2]: (empty) → Oficina"));
        assert!(text.contains("Sudadera [3]: Moda (unchanged)"));
        assert!(text.contains("3 products processed: 2 updated, 1 unchanged, 0 failed"));
    }
}
