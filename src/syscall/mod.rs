/*
 * Port I/O primitives
 *
 * What's left of the kernel's old syscall layer: the generic Io trait
 * and the Pio port-I/O implementation that the serial port and other
 * device drivers build on. The SYSCALL/SYSRET ABI and syscall dispatch
 * table lived here too, but both belong to userspace process support,
 * out of scope for a scheduler core.
 */

pub mod io;
pub mod pio;
