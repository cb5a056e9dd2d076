//! Document lifecycle state machine (C8): `PENDING -> PROCESSING ->
//! {READY, FAILED}`, implemented with the `state-machines` crate the way
//! the teacher's own ingestion pipeline models its states.

use state_machines::state_machine;

state_machine! {
    name: ProcessingMachine,
    state: ProcessingState,
    initial: Pending,
    states: [Pending, Processing, Ready, Failed],
    events {
        claim { transition: { from: Pending, to: Processing } }
        ok { transition: { from: Processing, to: Ready } }
        error {
            transition: { from: Processing, to: Failed }
        }
    }
}

pub fn pending() -> ProcessingMachine<(), Pending> {
    ProcessingMachine::new(())
}
