pub mod point;
pub mod vector;
pub mod bounds;
pub mod curves;
pub mod surfaces;
pub mod nurbs;
