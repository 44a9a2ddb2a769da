pub mod staff_auth;
