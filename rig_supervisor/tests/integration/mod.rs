mod rig;
mod safety_recovery;
mod scheduling;
mod startup;
