use std::collections::HashSet;

use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::error::MigrateError;
use crate::revision::{Ledger, Revision};

/// Where `migrate` should leave the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every revision reverted.
    Zero,
    /// Everything up to and including the revision at this chain position.
    Revision(usize),
    /// Every revision applied.
    Latest,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub reverted: Vec<String>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.reverted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionStatus {
    pub app: String,
    pub revision: String,
    /// Unix timestamp (seconds), absent when not applied
    pub applied_at: Option<i64>,
}

/// Runner for one app's revision chain.
///
/// With `atomic_ddl`, each revision and its ledger entry commit in a single
/// `BEGIN IMMEDIATE` transaction. Taking the write lock up front also
/// serialises concurrent runners against the same database.
pub struct Migrator {
    app: &'static str,
    revisions: Vec<Revision>,
    atomic_ddl: bool,
}

impl Migrator {
    /// Build a migrator, rejecting chains whose dependencies are unknown,
    /// point forwards, or cross into another app.
    pub fn new(
        app: &'static str,
        revisions: Vec<Revision>,
        atomic_ddl: bool,
    ) -> Result<Self, MigrateError> {
        let mut seen = HashSet::new();

        for revision in &revisions {
            if revision.app != app {
                return Err(MigrateError::Error(format!(
                    "Revision {} does not belong to app '{}'",
                    revision.qualified_name(),
                    app
                )));
            }
            for dep in &revision.dependencies {
                if !seen.contains(&dep.label()) {
                    return Err(MigrateError::DependencyOrder(format!(
                        "{} depends on {}.{}, which does not precede it in the chain",
                        revision.qualified_name(),
                        app,
                        dep
                    )));
                }
            }
            if !seen.insert(revision.id.label()) {
                return Err(MigrateError::Error(format!(
                    "Duplicate revision {}",
                    revision.qualified_name()
                )));
            }
        }

        Ok(Self {
            app,
            revisions,
            atomic_ddl,
        })
    }

    pub fn app(&self) -> &'static str {
        self.app
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn atomic_ddl(&self) -> bool {
        self.atomic_ddl
    }

    /// Resolve `zero`, a full label, or a unique label prefix such as `0027`.
    pub fn resolve(&self, target: &str) -> Result<Target, MigrateError> {
        let target = target.trim();
        if target == "zero" {
            return Ok(Target::Zero);
        }

        if let Some(pos) = self.revisions.iter().position(|r| r.id.label() == target) {
            return Ok(Target::Revision(pos));
        }

        let matches: Vec<usize> = self
            .revisions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.id.label().starts_with(target))
            .map(|(pos, _)| pos)
            .collect();

        match matches.as_slice() {
            [pos] => Ok(Target::Revision(*pos)),
            [] => Err(MigrateError::Error(format!(
                "Unknown revision '{}' for app '{}'",
                target, self.app
            ))),
            _ => Err(MigrateError::Error(format!(
                "Revision prefix '{}' is ambiguous for app '{}'",
                target, self.app
            ))),
        }
    }

    pub fn status(&self, conn: &Connection) -> Result<Vec<RevisionStatus>, MigrateError> {
        let ledger = Ledger::load(conn)?;
        Ok(self
            .revisions
            .iter()
            .map(|r| RevisionStatus {
                app: self.app.to_owned(),
                revision: r.id.label(),
                applied_at: ledger.applied_at(self.app, &r.id),
            })
            .collect())
    }

    /// Bring the schema to `target`: revert applied revisions beyond it,
    /// newest first, then apply pending revisions up to it, oldest first.
    pub fn migrate(
        &self,
        conn: &mut Connection,
        target: Target,
    ) -> Result<MigrationReport, MigrateError> {
        let keep = match target {
            Target::Zero => 0,
            Target::Revision(pos) => pos + 1,
            Target::Latest => self.revisions.len(),
        };

        let ledger = Ledger::load(conn)?;
        let mut report = MigrationReport::default();

        for revision in self.revisions[keep..].iter().rev() {
            if ledger.is_applied(self.app, &revision.id) && self.unapply(conn, revision)? {
                report.reverted.push(revision.qualified_name());
            }
        }

        for revision in &self.revisions[..keep] {
            if !ledger.is_applied(self.app, &revision.id) && self.apply(conn, revision)? {
                report.applied.push(revision.qualified_name());
            }
        }

        if report.is_empty() {
            info!("No revisions to apply or revert for '{}'", self.app);
        }

        Ok(report)
    }

    /// Move the ledger to `target` without running any operation.
    ///
    /// Used to adopt a database whose schema was already brought to a
    /// revision by other means. Entries beyond the target are forgotten,
    /// missing ones up to it are recorded, all in one transaction.
    pub fn fake(
        &self,
        conn: &mut Connection,
        target: Target,
    ) -> Result<MigrationReport, MigrateError> {
        let keep = match target {
            Target::Zero => 0,
            Target::Revision(pos) => pos + 1,
            Target::Latest => self.revisions.len(),
        };

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ledger = Ledger::load(&tx)?;
        let mut report = MigrationReport::default();

        for revision in self.revisions[keep..].iter().rev() {
            if ledger.is_applied(self.app, &revision.id) {
                ledger.forget(&tx, self.app, &revision.id)?;
                info!("Faked revert of {}", revision.qualified_name());
                report.reverted.push(revision.qualified_name());
            }
        }

        for revision in &self.revisions[..keep] {
            if !ledger.is_applied(self.app, &revision.id) {
                ledger.record(&tx, self.app, &revision.id)?;
                info!("Faked {}", revision.qualified_name());
                report.applied.push(revision.qualified_name());
            }
        }

        tx.commit()?;
        Ok(report)
    }

    /// SQL for the revision named by `target`.
    pub fn sql(
        &self,
        conn: &Connection,
        target: &str,
        backwards: bool,
    ) -> Result<Vec<String>, MigrateError> {
        match self.resolve(target)? {
            Target::Revision(pos) => self.revisions[pos].plan(conn, backwards),
            _ => Err(MigrateError::Error(format!(
                "'{}' does not name a single revision",
                target
            ))),
        }
    }

    /// Returns false when another runner applied the revision first.
    fn apply(&self, conn: &mut Connection, revision: &Revision) -> Result<bool, MigrateError> {
        if !self.atomic_ddl {
            let mut ledger = Ledger::load(conn)?;
            if ledger.is_applied(self.app, &revision.id) {
                return Ok(false);
            }
            if let Err(err) = revision.apply(conn, &ledger) {
                warn!(
                    "{} failed without a transaction; the schema may be partially altered",
                    revision.qualified_name()
                );
                return Err(err);
            }
            ledger.record(conn, self.app, &revision.id)?;
            return Ok(true);
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ledger = Ledger::load(&tx)?;
        if ledger.is_applied(self.app, &revision.id) {
            return Ok(false);
        }
        revision.apply(&tx, &ledger)?;
        ledger.record(&tx, self.app, &revision.id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Returns false when another runner reverted the revision first.
    fn unapply(&self, conn: &mut Connection, revision: &Revision) -> Result<bool, MigrateError> {
        if !self.atomic_ddl {
            let mut ledger = Ledger::load(conn)?;
            if !ledger.is_applied(self.app, &revision.id) {
                return Ok(false);
            }
            self.check_no_dependents(&ledger, revision)?;
            if let Err(err) = revision.revert(conn) {
                warn!(
                    "{} failed to revert without a transaction; the schema may be partially altered",
                    revision.qualified_name()
                );
                return Err(err);
            }
            ledger.forget(conn, self.app, &revision.id)?;
            return Ok(true);
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ledger = Ledger::load(&tx)?;
        if !ledger.is_applied(self.app, &revision.id) {
            return Ok(false);
        }
        self.check_no_dependents(&ledger, revision)?;
        revision.revert(&tx)?;
        ledger.forget(&tx, self.app, &revision.id)?;
        tx.commit()?;
        Ok(true)
    }

    fn check_no_dependents(&self, ledger: &Ledger, revision: &Revision) -> Result<(), MigrateError> {
        let dependent = self.revisions.iter().find(|other| {
            other.dependencies.contains(&revision.id) && ledger.is_applied(self.app, &other.id)
        });

        match dependent {
            Some(other) => Err(MigrateError::DependencyOrder(format!(
                "cannot revert {}: {} depends on it and is still applied",
                revision.qualified_name(),
                other.qualified_name()
            ))),
            None => Ok(()),
        }
    }

    /// Revert a single revision, refusing while a dependent is applied.
    pub fn revert_one(&self, conn: &mut Connection, target: &str) -> Result<bool, MigrateError> {
        match self.resolve(target)? {
            Target::Revision(pos) => self.unapply(conn, &self.revisions[pos]),
            _ => Err(MigrateError::Error(format!(
                "'{}' does not name a single revision",
                target
            ))),
        }
    }
}
