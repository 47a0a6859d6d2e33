//! Ready-made memory models.

use relax_ir::EventFilter;

use crate::axiom::AxiomKind;
use crate::error::WmmError;
use crate::model::{MemoryModel, CO, EXT, LOC, PO, RF};
use crate::relation::{RelationId, RelationKind};

/// `fr = rf^-1 ; co`
fn from_read(m: &mut MemoryModel) -> Result<RelationId, WmmError> {
    let rf_inv = m.add(RelationKind::Inverse(RF))?;
    let seq = m.add(RelationKind::Composition(rf_inv, CO))?;
    m.define("fr", RelationKind::Union(vec![seq]))
}

/// Sequential consistency.
pub fn sc() -> Result<MemoryModel, WmmError> {
    let mut m = MemoryModel::new().with_name("sc");
    let fr = from_read(&mut m)?;
    let hb = m.add(RelationKind::Union(vec![PO, RF, CO, fr]))?;
    m.axiom_on(AxiomKind::Acyclic, hb, false)?;
    m.validate()?;
    Ok(m)
}

/// x86-TSO: stores may be delayed past later loads unless an `Mfence`
/// separates them.
pub fn tso() -> Result<MemoryModel, WmmError> {
    let mut m = MemoryModel::new().with_name("tso");
    let fr = from_read(&mut m)?;

    let po_loc = m.define("po-loc", RelationKind::Intersection(vec![PO, LOC]))?;
    let uniproc = m.define("uniproc", RelationKind::Union(vec![po_loc, RF, CO, fr]))?;
    m.axiom_on(AxiomKind::Acyclic, uniproc, false)?;

    let rm = m.add(RelationKind::Cartesian(EventFilter::Read, EventFilter::Memory))?;
    let ww = m.add(RelationKind::Cartesian(EventFilter::Write, EventFilter::Write))?;
    let po_rm = m.add(RelationKind::Intersection(vec![PO, rm]))?;
    let po_ww = m.add(RelationKind::Intersection(vec![PO, ww]))?;
    let ppo = m.define("ppo", RelationKind::Union(vec![po_rm, po_ww]))?;
    let rfe = m.define("rfe", RelationKind::Intersection(vec![RF, EXT]))?;
    let mfence = m.define("mfence", RelationKind::FenceRel("Mfence".into()))?;
    let ghb = m.define("tso-ghb", RelationKind::Union(vec![ppo, rfe, CO, fr, mfence]))?;
    m.axiom_on(AxiomKind::Acyclic, ghb, false)?;

    m.validate()?;
    Ok(m)
}
