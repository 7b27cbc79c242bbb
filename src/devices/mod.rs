
// Currently only the Rigol DS1000Z family is supported. Other scopes calibrate their raw codes
// differently and would get a module of their own.

pub mod ds1000z;
