pub const DEFAULT_PORT: u16 = 27015;
