use crate::context::ReconcileContext;
use crate::error::RemoteError;
use crate::fields::{
    HeaderKind, CUSTOM_DATA, CUSTOM_LENGTH, IPV4_DSCP, IPV4_PRIORITY_RAW, IPV4_TOS, STACK_IGNORE,
};
use crate::flow::{FieldPatterns, Header, Pattern, Priority};
use crate::pattern;
use crate::remote::*;

/// Align the stacks of a config element with the headers of a flow, then configure
/// the fields of every header.
///
/// A non-empty header list is authoritative: the stacks end up being exactly these
/// headers in that order, followed by the stacks the controller always keeps (the
/// frame check sequence). An empty list leaves the default stack of the controller.
pub fn reconcile_stack(
    store: &mut impl RemoteStore,
    config_element: &Href,
    headers: &[Header],
    ctx: &mut ReconcileContext,
) -> Result<(), RemoteError> {
    if headers.is_empty() {
        return Ok(());
    }
    let snapshot = store.find(config_element, Kind::Stack, &[])?;
    let mut type_ids = Vec::with_capacity(snapshot.len());
    for stack in snapshot.iter() {
        type_ids.push(attribute_str(&store.read(stack)?, "stackTypeId"));
    }
    let mut to_remove = vec![];
    let mut previous: Option<Href> = None;
    for (i, header) in headers.iter().enumerate() {
        let kind = header.kind();
        let stack = match (snapshot.get(i), type_ids.get(i)) {
            (Some(existing), Some(type_id)) => {
                if STACK_IGNORE.contains(&type_id.as_str()) {
                    store.append_protocol(config_element, previous.as_ref(), kind.stack_type_id())?
                } else if HeaderKind::from_stack_type_id(type_id) != Some(kind) {
                    log::trace!("Replace stack {type_id} by {kind}");
                    to_remove.push(existing.clone());
                    store.append_protocol(config_element, Some(existing), kind.stack_type_id())?
                } else {
                    existing.clone()
                }
            }
            _ => store.append_protocol(config_element, previous.as_ref(), kind.stack_type_id())?,
        };
        configure_header(store, &stack, header, ctx);
        previous = Some(stack);
    }
    for (stack, type_id) in snapshot.iter().zip(type_ids.iter()).skip(headers.len()) {
        if !STACK_IGNORE.contains(&type_id.as_str()) && !to_remove.contains(stack) {
            to_remove.push(stack.clone());
        }
    }
    for stack in to_remove.iter() {
        store.remove(stack)?;
    }
    Ok(())
}

fn configure_header(
    store: &mut impl RemoteStore,
    stack: &Href,
    header: &Header,
    ctx: &mut ReconcileContext,
) {
    let table = header.kind().field_table();
    match header {
        Header::Ethernet(fields)
        | Header::Vlan(fields)
        | Header::Tcp(fields)
        | Header::Udp(fields)
        | Header::PfcPause(fields) => configure_fields(store, stack, table, fields, false, ctx),
        Header::Ipv4(ipv4) => {
            configure_fields(store, stack, table, &ipv4.fields, false, ctx);
            match &ipv4.priority {
                Some(Priority::Raw(p)) => configure_field(store, stack, IPV4_PRIORITY_RAW, p, false, ctx),
                Some(Priority::Tos(fields)) => configure_fields(store, stack, IPV4_TOS, fields, true, ctx),
                Some(Priority::Dscp(fields)) => configure_fields(store, stack, IPV4_DSCP, fields, true, ctx),
                None => (),
            }
        }
        Header::Custom(custom) => {
            // the length is in bits, two hexadecimal digits per byte
            let length = Pattern::fixed(custom.bytes.len() as i64 * 4);
            configure_field(store, stack, CUSTOM_LENGTH, &length, false, ctx);
            configure_field(store, stack, CUSTOM_DATA, &Pattern::fixed(custom.bytes.as_str()), false, ctx);
        }
    }
}

fn configure_fields(
    store: &mut impl RemoteStore,
    stack: &Href,
    table: &[(&str, &str)],
    fields: &FieldPatterns,
    field_choice: bool,
    ctx: &mut ReconcileContext,
) {
    for (name, pattern) in fields.iter() {
        match table.iter().find(|(n, _)| *n == name.as_str()) {
            Some((_, field_type_id)) => {
                configure_field(store, stack, field_type_id, pattern, field_choice, ctx)
            }
            None => log::trace!("Field {name} is not mapped, ignored"),
        }
    }
}

fn configure_field(
    store: &mut impl RemoteStore,
    stack: &Href,
    field_type_id: &str,
    pattern: &Pattern,
    field_choice: bool,
    ctx: &mut ReconcileContext,
) {
    if let Err(e) = pattern::resolve(store, stack, field_type_id, pattern, field_choice, ctx) {
        ctx.record(e);
    }
}
