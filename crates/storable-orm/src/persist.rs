//! Storing and deleting instances.
//!
//! A new instance first claims an id from the id-allocation table, then its
//! row is inserted under that id. The two inserts are not wrapped in a
//! transaction; a failure in between leaves an unused id behind.

use std::rc::Rc;

use storable_core::reserved::id_table_name;
use storable_core::{Params, SqlValue};
use tracing::{debug, info};

use crate::audit::{AuditAction, AuditEvent};
use crate::error::{OrmError, Result};
use crate::instance::EntityRef;
use crate::session::Session;
use crate::value::to_column;

impl Session {
    /// Writes `entity` to its connection.
    ///
    /// A new instance gets an id and every set property is inserted. A stored
    /// one only sends modified columns; nothing is sent (and no hook runs)
    /// when nothing changed. `force` skips the editability check.
    ///
    /// # Errors
    ///
    /// [`OrmError::NotEditable`] when the check fails, [`OrmError::NotStored`]
    /// when a referenced instance has no id yet, [`OrmError::AbstractEntity`]
    /// for abstract types.
    pub fn store<E: AsRef<EntityRef> + ?Sized>(&self, entity: &E, force: bool) -> Result<()> {
        let entity = entity.as_ref();
        let (descriptor, connection, id, label) = {
            let state = entity.state();
            (
                Rc::clone(state.descriptor()),
                state.connection().to_string(),
                state.id(),
                state.label(),
            )
        };
        if descriptor.is_abstract {
            return Err(OrmError::AbstractEntity(descriptor.entity_name.clone()));
        }
        let hooks = self.hooks(entity);
        if !force && !(hooks.editable)(entity, self) {
            return Err(OrmError::NotEditable(label));
        }

        let changes = {
            let state = entity.state();
            let mut changes = Vec::new();
            for property in descriptor.properties() {
                if property.name == "id" {
                    continue;
                }
                if id.is_some() && !state.modified.contains(&property.name) {
                    continue;
                }
                if let Some(value) = state.values.get(&property.name) {
                    changes.push((property.name.clone(), to_column(value)?));
                } else if let Some(raw) = state.db_values.get(&property.name) {
                    changes.push((property.name.clone(), raw.clone()));
                }
            }
            changes
        };

        let conn = self.connection(Some(&connection))?;
        let (id, action) = match id {
            Some(id) => {
                if changes.is_empty() {
                    debug!(entity = %label, "nothing to store");
                    return Ok(());
                }
                conn.update(
                    &descriptor.table_name,
                    &changes,
                    "`id` = {0}",
                    &Params::positional([id]),
                )?;
                (id, AuditAction::Updated)
            }
            None => {
                let prefix = self.registry().prefix().to_string();
                conn.insert(
                    &id_table_name(&prefix),
                    &[(
                        "entity".to_string(),
                        SqlValue::Text(descriptor.entity_name.clone()),
                    )],
                )?;
                let id = conn.last_insert_id().ok_or_else(|| {
                    storable_core::Error::query("no id was generated", &id_table_name(&prefix), false)
                })?;
                let mut row = Vec::with_capacity(changes.len() + 1);
                row.push(("id".to_string(), SqlValue::Int(id)));
                row.extend(changes.iter().cloned());
                conn.insert(&descriptor.table_name, &row)?;
                (id, AuditAction::Created)
            }
        };

        {
            let mut state = entity.state_mut();
            state.id = Some(id);
            for (column, value) in &changes {
                state.db_values.insert(column.clone(), value.clone());
            }
            state.modified.clear();
        }
        if action == AuditAction::Created {
            self.cache_insert(entity);
        }
        info!(entity = %descriptor.entity_name, id, action = action.as_str(), "stored");

        (hooks.stored)(entity, self);
        self.audit(AuditEvent {
            action,
            entity: descriptor.entity_name.clone(),
            id,
            connection,
            changed: changes.into_iter().map(|(column, _)| column).collect(),
        });
        Ok(())
    }

    /// Deletes `entity` from its table and from the id-allocation table.
    ///
    /// The instance is evicted from the cache and loses its id; storing it
    /// again inserts a new row holding every property, including the ones
    /// that were never read. Lazy properties are loaded before the row goes
    /// away. `force` skips the deletability check.
    pub fn delete<E: AsRef<EntityRef> + ?Sized>(&self, entity: &E, force: bool) -> Result<()> {
        let entity = entity.as_ref();
        let (descriptor, connection, id, label) = {
            let state = entity.state();
            (
                Rc::clone(state.descriptor()),
                state.connection().to_string(),
                state.id(),
                state.label(),
            )
        };
        let Some(id) = id else {
            return Err(OrmError::NotStored(label));
        };
        let hooks = self.hooks(entity);
        if !force && !(hooks.deletable)(entity, self) {
            return Err(OrmError::NotDeletable(label));
        }

        for property in descriptor.properties() {
            let loaded = {
                let state = entity.state();
                state.values.contains_key(&property.name)
                    || state.db_values.contains_key(&property.name)
            };
            if property.lazy && !loaded {
                self.load_lazy(entity, property)?;
            }
        }

        let conn = self.connection(Some(&connection))?;
        let params = Params::positional([id]);
        conn.delete(&descriptor.table_name, "`id` = {0}", &params)?;
        conn.delete(
            &id_table_name(self.registry().prefix()),
            "`id` = {0}",
            &params,
        )?;

        self.cache_remove(&connection, id);
        {
            let mut state = entity.state_mut();
            state.id = None;
            let held: Vec<String> = state
                .values
                .keys()
                .chain(state.db_values.keys())
                .cloned()
                .collect();
            state.modified.extend(held);
        }
        info!(entity = %descriptor.entity_name, id, "deleted");

        (hooks.deleted)(entity, self);
        self.audit(AuditEvent {
            action: AuditAction::Deleted,
            entity: descriptor.entity_name.clone(),
            id,
            connection,
            changed: Vec::new(),
        });
        Ok(())
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(sink) = self.audit_sink() {
            sink.record(&event);
        }
    }
}
