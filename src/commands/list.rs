//! List command implementation

use crate::backends;

/// List all backends compiled into this binary
pub fn list_backends() {
    print!("{}", backends::backend_help());
    println!();
    println!("Backend strings take the form name[:key=value,...], e.g.");
    println!("  dummy:echo=1");
    println!("  linux:dev=/dev/spidev0.1,gpiochip=0,nss=8,drdy=25");
}
